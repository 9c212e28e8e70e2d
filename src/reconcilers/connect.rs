//! Reconciliation of KafkaConnect and KafkaConnectS2I resources
//!
//! A pass holds the resource's lock from start to finish. It reads the
//! resource, converges its connectors with the Connect REST API and writes
//! the resulting status. When the resource is gone, the connectors that
//! still point at it are marked as orphaned instead.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use kube::Resource;
use tracing::{debug, info, info_span, warn, Instrument};

use super::connectors::ConnectorSynchronizer;
use super::lock::ResourceLock;
use super::reconciliation::Reconciliation;
use super::resolver::{no_connect_cluster, ParentResolver};
use super::status::StatusReconciler;
use crate::adapters::{ConnectEndpoint, DesiredStateBuilder, ResourceStore};
use crate::crd::{Condition, ConnectCluster, KafkaConnectStatus};
use crate::error::Result;
use crate::metrics;

/// How a pass ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Lock not obtained in time; nothing was read or changed
    LockTimeout,
    /// Resource no longer exists; its connectors were marked orphaned
    CleanedUp,
    /// Resource and all its connectors converged
    Reconciled,
    /// The pass completed but something failed; the error is in the status
    Failed(String),
}

/// Drives reconciliation passes for one cluster kind
pub struct ConnectReconciler<K: ConnectCluster> {
    store: Arc<dyn ResourceStore<K>>,
    locks: ResourceLock,
    synchronizer: Arc<ConnectorSynchronizer>,
    resolver: Arc<ParentResolver>,
    builder: Arc<dyn DesiredStateBuilder<K>>,
    status: StatusReconciler<K>,
    lock_timeout: Duration,
}

impl<K: ConnectCluster> ConnectReconciler<K> {
    pub fn new(
        store: Arc<dyn ResourceStore<K>>,
        locks: ResourceLock,
        synchronizer: Arc<ConnectorSynchronizer>,
        resolver: Arc<ParentResolver>,
        builder: Arc<dyn DesiredStateBuilder<K>>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            status: StatusReconciler::new(store.clone()),
            store,
            locks,
            synchronizer,
            resolver,
            builder,
            lock_timeout,
        }
    }

    /// Run one pass; errors end up in status and logs, never in the caller
    pub async fn reconcile(&self, reconciliation: Reconciliation) -> PassOutcome {
        let kind = K::PARENT_KIND.as_str();
        metrics::RECONCILIATIONS
            .with_label_values(&[kind, reconciliation.trigger().as_str()])
            .inc();
        let _timer = metrics::RECONCILE_DURATION
            .with_label_values(&[kind])
            .start_timer();

        let span = info_span!("reconcile", reconciliation = %reconciliation);
        let outcome = self.run(&reconciliation).instrument(span).await;

        if let PassOutcome::Failed(_) = outcome {
            metrics::RECONCILIATION_FAILURES
                .with_label_values(&[kind])
                .inc();
        }
        outcome
    }

    async fn run(&self, reconciliation: &Reconciliation) -> PassOutcome {
        let _guard = match self
            .locks
            .acquire(
                reconciliation.lock_key(),
                reconciliation.to_string(),
                self.lock_timeout,
            )
            .await
        {
            Ok(guard) => guard,
            Err(e) => {
                warn!(%reconciliation, error = %e, "Failed to acquire lock, skipping this pass");
                metrics::LOCK_TIMEOUTS
                    .with_label_values(&[K::PARENT_KIND.as_str()])
                    .inc();
                return PassOutcome::LockTimeout;
            }
        };
        debug!(%reconciliation, "Lock acquired");

        match self
            .store
            .get(reconciliation.namespace(), reconciliation.name())
            .await
        {
            Ok(Some(resource)) => self.converge(reconciliation, resource).await,
            Ok(None) => match self.cleanup(reconciliation).await {
                Ok(()) => PassOutcome::CleanedUp,
                Err(e) => {
                    warn!(%reconciliation, error = %e, "Failed to clean up connectors");
                    PassOutcome::Failed(e.to_string())
                }
            },
            Err(e) => {
                warn!(%reconciliation, error = %e, "Failed to fetch resource");
                PassOutcome::Failed(e.to_string())
            }
        }
    }

    async fn converge(&self, reconciliation: &Reconciliation, resource: K) -> PassOutcome {
        let generation = resource.meta().generation;
        info!(%reconciliation, generation = ?generation, "{} should be created or updated", K::PARENT_KIND);

        let (url, result) = match self.builder.build(&resource) {
            Ok(desired) => {
                let result = self
                    .reconcile_connectors(reconciliation, &resource, &desired.endpoint)
                    .await;
                (Some(desired.url), result)
            }
            Err(e) => (None, Err(e)),
        };

        let status = KafkaConnectStatus {
            conditions: vec![Condition::from_outcome(result.as_ref().err())],
            observed_generation: generation,
            url,
        };
        let status_result = self
            .status
            .reconcile(
                reconciliation,
                reconciliation.namespace(),
                reconciliation.name(),
                status,
            )
            .await;

        match (result, status_result) {
            (Ok(()), Ok(_)) => {
                info!(%reconciliation, "{} reconciled", K::PARENT_KIND);
                PassOutcome::Reconciled
            }
            (Err(e), _) | (Ok(()), Err(e)) => {
                warn!(%reconciliation, error = %e, reason = e.reason(), "{} reconciliation failed", K::PARENT_KIND);
                PassOutcome::Failed(e.to_string())
            }
        }
    }

    async fn reconcile_connectors(
        &self,
        reconciliation: &Reconciliation,
        resource: &K,
        endpoint: &ConnectEndpoint,
    ) -> Result<()> {
        // Connectors carry only the cluster name, so a cluster of another
        // kind with the same name may own them
        let resolution = self
            .resolver
            .resolve_name(reconciliation.namespace(), reconciliation.name())
            .await?;
        let owner = resolution.parent.kind();
        if owner != K::PARENT_KIND {
            info!(
                %reconciliation,
                "Connectors labelled {} belong to the {} of the same name, not synchronizing them",
                reconciliation.name(),
                owner
            );
            return Ok(());
        }

        self.synchronizer
            .synchronize(reconciliation, resource, endpoint)
            .await?
            .into_result()
            .map(|_| ())
    }

    /// Mark every connector of a deleted cluster as pointing at nothing
    async fn cleanup(&self, reconciliation: &Reconciliation) -> Result<()> {
        let namespace = reconciliation.namespace();
        let name = reconciliation.name();
        info!(%reconciliation, "{} deleted", K::PARENT_KIND);

        match self.resolver.resolve_name(namespace, name).await {
            Ok(resolution) => {
                debug!(
                    %reconciliation,
                    "Connectors labelled {} now belong to the {} of the same name",
                    name,
                    resolution.parent.kind()
                );
                return Ok(());
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let connectors = self.synchronizer.list_connectors(namespace, name).await?;
        if connectors.is_empty() {
            return Ok(());
        }
        metrics::ORPHANED_CONNECTORS
            .with_label_values(&[K::PARENT_KIND.as_str()])
            .inc_by(connectors.len() as f64);

        let error = no_connect_cluster(namespace, name);
        let results = join_all(
            connectors
                .iter()
                .map(|connector| self.synchronizer.report(reconciliation, connector, Some(&error))),
        )
        .await;

        match results.into_iter().find_map(|r| r.err()) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
