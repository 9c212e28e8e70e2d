//! Handling of KafkaConnector watch events
//!
//! A change to a single connector does not need a whole cluster pass. The
//! owning cluster is resolved from the connector's label and only that
//! connector is reconciled, under the cluster's lock.

use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;
use tracing::{debug, info_span, warn, Instrument};

use super::connectors::{ConnectorSynchronizer, Disposition};
use super::lock::ResourceLock;
use super::reconciliation::{Reconciliation, TriggerSource};
use super::resolver::{missing_label, Parent, ParentResolver};
use crate::adapters::DesiredStateBuilder;
use crate::crd::{ConnectCluster, KafkaConnect, KafkaConnectS2I, KafkaConnector, ParentKind};
use crate::error::Error;

/// A change observed on a KafkaConnector
#[derive(Clone, Debug)]
pub enum ConnectorEvent {
    Apply(KafkaConnector),
    Delete(KafkaConnector),
}

impl ConnectorEvent {
    pub fn connector(&self) -> &KafkaConnector {
        match self {
            ConnectorEvent::Apply(c) | ConnectorEvent::Delete(c) => c,
        }
    }
}

/// How a connector event was handled
#[derive(Debug)]
pub enum EventOutcome {
    /// The connector's cluster could not be determined; recorded in its status
    Unresolved(Error),
    /// The cluster lock was not obtained in time
    LockTimeout,
    /// The connector's cluster changed kind while waiting for the lock; the
    /// new cluster's own pass covers the connector
    Superseded,
    /// The connector was reconciled against its cluster
    Synchronized(Disposition),
}

/// Reconciles single connectors in response to watch events
pub struct ConnectorEventHandler {
    resolver: Arc<ParentResolver>,
    synchronizer: Arc<ConnectorSynchronizer>,
    locks: ResourceLock,
    connect_model: Arc<dyn DesiredStateBuilder<KafkaConnect>>,
    connect_s2i_model: Arc<dyn DesiredStateBuilder<KafkaConnectS2I>>,
    lock_timeout: Duration,
}

impl ConnectorEventHandler {
    pub fn new(
        resolver: Arc<ParentResolver>,
        synchronizer: Arc<ConnectorSynchronizer>,
        locks: ResourceLock,
        connect_model: Arc<dyn DesiredStateBuilder<KafkaConnect>>,
        connect_s2i_model: Arc<dyn DesiredStateBuilder<KafkaConnectS2I>>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            synchronizer,
            locks,
            connect_model,
            connect_s2i_model,
            lock_timeout,
        }
    }

    pub async fn handle(&self, event: ConnectorEvent) -> EventOutcome {
        let connector = event.connector();
        let name = connector.name_any();
        let namespace = connector.namespace().unwrap_or_default();

        let deleted = matches!(event, ConnectorEvent::Delete(_));
        let Some(cluster) = connector.cluster_label().map(str::to_string) else {
            return self.unresolved(connector, missing_label(), deleted).await;
        };
        let resolution = match self.resolver.resolve(connector).await {
            Ok(resolution) => resolution,
            Err(e) => return self.unresolved(connector, e, deleted).await,
        };

        let reconciliation = Reconciliation::new(
            TriggerSource::ConnectorWatch,
            resolution.parent.kind(),
            &namespace,
            &cluster,
        );
        let span = info_span!("connector", reconciliation = %reconciliation, connector = %name);
        async {
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
                    warn!(%reconciliation, error = %e, "Failed to acquire lock, skipping connector {}", name);
                    return EventOutcome::LockTimeout;
                }
            };

            // The cluster may have changed while waiting for its lock
            let resolution = match self.resolver.resolve_name(&namespace, &cluster).await {
                Ok(resolution) => resolution,
                Err(e) => return self.unresolved(connector, e, deleted).await,
            };
            if resolution.parent.kind() != reconciliation.kind() {
                debug!(
                    %reconciliation,
                    now = %resolution.parent.kind(),
                    "Cluster of connector {} changed kind while waiting for the lock", name
                );
                return EventOutcome::Superseded;
            }

            let desired = match &event {
                ConnectorEvent::Apply(c) => Some(c),
                ConnectorEvent::Delete(_) => None,
            };
            match &resolution.parent {
                Parent::Connect(parent) => {
                    self.synchronize(&reconciliation, parent, self.connect_model.as_ref(), &name, desired)
                        .await
                }
                Parent::ConnectS2I(parent) => {
                    self.synchronize(&reconciliation, parent, self.connect_s2i_model.as_ref(), &name, desired)
                        .await
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Reconcile one connector against `parent`; the caller holds the cluster lock
    async fn synchronize<K: ConnectCluster>(
        &self,
        reconciliation: &Reconciliation,
        parent: &K,
        model: &dyn DesiredStateBuilder<K>,
        name: &str,
        connector: Option<&KafkaConnector>,
    ) -> EventOutcome {
        let desired = match model.build(parent) {
            Ok(desired) => desired,
            Err(e) => {
                warn!(%reconciliation, error = %e, "Cannot reach the REST API of {}", K::PARENT_KIND);
                if let Some(connector) = connector {
                    self.report(reconciliation, connector, &e).await;
                }
                return EventOutcome::Synchronized(Disposition::Failed(e));
            }
        };

        let outcome = self
            .synchronizer
            .synchronize_one(reconciliation, parent, &desired.endpoint, name, connector)
            .await;
        debug!(%reconciliation, connector = %name, disposition = ?outcome.disposition, "Connector event handled");
        EventOutcome::Synchronized(outcome.disposition)
    }

    /// Record a resolution failure; deleted connectors have no status left to write
    async fn unresolved(&self, connector: &KafkaConnector, error: Error, deleted: bool) -> EventOutcome {
        let namespace = connector.namespace().unwrap_or_default();
        let cluster = connector.cluster_label().unwrap_or_default();
        let reconciliation = Reconciliation::new(
            TriggerSource::ConnectorWatch,
            ParentKind::KafkaConnect,
            namespace,
            cluster,
        );
        warn!(%reconciliation, connector = %connector.name_any(), error = %error, "Cannot resolve the cluster of connector");
        if !deleted {
            self.report(&reconciliation, connector, &error).await;
        }
        EventOutcome::Unresolved(error)
    }

    async fn report(&self, reconciliation: &Reconciliation, connector: &KafkaConnector, error: &Error) {
        if let Err(e) = self
            .synchronizer
            .report(reconciliation, connector, Some(error))
            .await
        {
            warn!(%reconciliation, error = %e, "Failed to record error in status of connector {}", connector.name_any());
        }
    }
}
