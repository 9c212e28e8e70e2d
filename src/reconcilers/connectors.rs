//! Synchronization of KafkaConnector resources with a running Connect cluster
//!
//! The connectors running in the cluster are listed live on every pass.
//! Running connectors without a KafkaConnector are deleted, every
//! KafkaConnector is created or updated, and each KafkaConnector gets its
//! own status. Operations are independent: one failing never stops or rolls
//! back the others.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use kube::ResourceExt;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::reconciliation::Reconciliation;
use super::status::{StatusReconciler, StatusUpdate};
use crate::adapters::{ConnectApi, ConnectEndpoint, ResourceStore};
use crate::crd::{
    Condition, ConnectCluster, KafkaConnector, KafkaConnectorSpec, KafkaConnectorStatus,
    CLUSTER_LABEL, USE_CONNECTOR_RESOURCES_ANNOTATION,
};
use crate::error::{Error, Result};
use crate::metrics;

/// Connect configuration key of the connector class
pub const CONNECTOR_CLASS: &str = "connector.class";

/// Connect configuration key of the maximum task count
pub const TASKS_MAX: &str = "tasks.max";

/// Task count used when `spec.tasksMax` is not set
const DEFAULT_TASKS_MAX: i32 = 1;

/// Configuration sent to the Connect REST API for one connector
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorPayload {
    pub config: Map<String, Value>,
    /// Keys of `spec.config` that were discarded in favour of dedicated spec fields
    pub overridden: Vec<String>,
}

/// Translate a connector spec into its REST configuration
///
/// `connector.class` and `tasks.max` always come from `spec.class` and
/// `spec.tasksMax`; the same keys in `spec.config` are dropped.
pub fn connector_payload(spec: &KafkaConnectorSpec) -> Result<ConnectorPayload> {
    let class_name = spec
        .class_name
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::config("spec.class is required"))?;
    let tasks_max = spec.tasks_max.unwrap_or(DEFAULT_TASKS_MAX);
    if tasks_max < 1 {
        return Err(Error::config(format!(
            "spec.tasksMax must be at least 1, got {}",
            tasks_max
        )));
    }

    let mut config = Map::new();
    let mut overridden = Vec::new();
    for (key, value) in &spec.config {
        if key == CONNECTOR_CLASS || key == TASKS_MAX {
            overridden.push(key.clone());
        } else {
            config.insert(key.clone(), value.clone());
        }
    }
    config.insert(CONNECTOR_CLASS.to_string(), Value::from(class_name));
    config.insert(TASKS_MAX.to_string(), Value::from(tasks_max));

    Ok(ConnectorPayload { config, overridden })
}

/// What happened to one connector during a pass
#[derive(Debug)]
pub enum Disposition {
    /// Removed from the Connect cluster
    Deleted,
    /// Created or updated in the Connect cluster
    Upserted,
    /// Never sent to the Connect cluster; the reason is in its status
    Rejected(Error),
    /// An operation failed
    Failed(Error),
}

impl Disposition {
    pub fn error(&self) -> Option<&Error> {
        match self {
            Disposition::Rejected(e) | Disposition::Failed(e) => Some(e),
            Disposition::Deleted | Disposition::Upserted => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Disposition::Failed(_))
    }
}

/// Per-connector result
#[derive(Debug)]
pub struct ConnectorOutcome {
    pub name: String,
    pub disposition: Disposition,
}

/// Result of a synchronization pass
#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub outcomes: Vec<ConnectorOutcome>,
}

impl SyncOutcome {
    pub fn failures(&self) -> impl Iterator<Item = &ConnectorOutcome> {
        self.outcomes.iter().filter(|o| o.disposition.is_failure())
    }

    /// The pass succeeded when no individual operation failed
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Names with the given disposition, for assertions and logging
    pub fn names(&self, matches: impl Fn(&Disposition) -> bool) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| matches(&o.disposition))
            .map(|o| o.name.as_str())
            .collect()
    }

    /// Collapse into an error describing every failed connector
    pub fn into_result(self) -> Result<SyncOutcome> {
        if self.is_success() {
            return Ok(self);
        }
        let failures: Vec<String> = self
            .failures()
            .map(|o| match o.disposition.error() {
                Some(e) => format!("{}: {}", o.name, e),
                None => o.name.clone(),
            })
            .collect();
        Err(Error::external_api(format!(
            "Failed to reconcile {} of {} connectors: {}",
            failures.len(),
            self.outcomes.len(),
            failures.join("; ")
        )))
    }
}

/// Converges the connectors of one Connect cluster
pub struct ConnectorSynchronizer {
    connect_api: Arc<dyn ConnectApi>,
    connectors: Arc<dyn ResourceStore<KafkaConnector>>,
    status: StatusReconciler<KafkaConnector>,
    operation_timeout: Duration,
}

impl ConnectorSynchronizer {
    pub fn new(
        connect_api: Arc<dyn ConnectApi>,
        connectors: Arc<dyn ResourceStore<KafkaConnector>>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            status: StatusReconciler::new(connectors.clone()),
            connect_api,
            connectors,
            operation_timeout,
        }
    }

    /// KafkaConnector resources labelled for the cluster `name`
    pub async fn list_connectors(&self, namespace: &str, cluster: &str) -> Result<Vec<KafkaConnector>> {
        let selector = format!("{}={}", CLUSTER_LABEL, cluster);
        self.connectors.list(Some(namespace), Some(&selector)).await
    }

    /// Bring the connectors running in `parent` in line with its KafkaConnector resources
    ///
    /// Fails as a whole only when the running or desired set cannot be
    /// listed; individual failures are reported in the outcome.
    pub async fn synchronize<K: ConnectCluster>(
        &self,
        reconciliation: &Reconciliation,
        parent: &K,
        endpoint: &ConnectEndpoint,
    ) -> Result<SyncOutcome> {
        let (running, desired) = futures::try_join!(
            self.call("Listing connectors", self.connect_api.list(endpoint)),
            self.list_connectors(reconciliation.namespace(), reconciliation.name()),
        )?;

        let desired_names: BTreeSet<String> = desired.iter().map(|c| c.name_any()).collect();
        let to_delete: Vec<String> = running
            .into_iter()
            .filter(|name| !desired_names.contains(name))
            .collect();
        debug!(%reconciliation, required = ?desired_names, delete = ?to_delete, "Synchronizing connectors");

        let deletions = join_all(
            to_delete
                .iter()
                .map(|name| self.delete_connector(reconciliation, endpoint, name)),
        );
        let upserts = join_all(
            desired
                .iter()
                .map(|connector| self.apply_connector(reconciliation, parent, endpoint, connector)),
        );
        let (deleted, upserted) = futures::join!(deletions, upserts);

        let outcome = SyncOutcome {
            outcomes: deleted.into_iter().chain(upserted).collect(),
        };
        info!(
            %reconciliation,
            deleted = outcome.names(|d| matches!(d, Disposition::Deleted)).len(),
            upserted = outcome.names(|d| matches!(d, Disposition::Upserted)).len(),
            rejected = outcome.names(|d| matches!(d, Disposition::Rejected(_))).len(),
            failed = outcome.names(Disposition::is_failure).len(),
            "Connectors synchronized"
        );
        Ok(outcome)
    }

    /// Reconcile a single connector; `None` means its resource was deleted
    pub async fn synchronize_one<K: ConnectCluster>(
        &self,
        reconciliation: &Reconciliation,
        parent: &K,
        endpoint: &ConnectEndpoint,
        name: &str,
        connector: Option<&KafkaConnector>,
    ) -> ConnectorOutcome {
        match connector {
            Some(connector) => {
                self.apply_connector(reconciliation, parent, endpoint, connector)
                    .await
            }
            None => self.delete_connector(reconciliation, endpoint, name).await,
        }
    }

    /// Record the outcome of an operation in the connector's status
    pub async fn report(
        &self,
        reconciliation: &Reconciliation,
        connector: &KafkaConnector,
        error: Option<&Error>,
    ) -> Result<StatusUpdate> {
        let status = KafkaConnectorStatus {
            conditions: vec![Condition::from_outcome(error)],
            observed_generation: connector.metadata.generation,
        };
        let namespace = connector
            .namespace()
            .unwrap_or_else(|| reconciliation.namespace().to_string());
        self.status
            .reconcile(reconciliation, &namespace, &connector.name_any(), status)
            .await
    }

    async fn delete_connector(
        &self,
        reconciliation: &Reconciliation,
        endpoint: &ConnectEndpoint,
        name: &str,
    ) -> ConnectorOutcome {
        debug!(%reconciliation, connector = %name, "Deleting connector");
        let result = self
            .call(
                &format!("Deleting connector {}", name),
                self.connect_api.delete(endpoint, name),
            )
            .await;

        let disposition = match result {
            Ok(()) => Disposition::Deleted,
            Err(e) => {
                warn!(%reconciliation, connector = %name, error = %e, "Failed to delete connector");
                Disposition::Failed(e)
            }
        };
        record_operation("delete", &disposition);
        ConnectorOutcome {
            name: name.to_string(),
            disposition,
        }
    }

    async fn apply_connector<K: ConnectCluster>(
        &self,
        reconciliation: &Reconciliation,
        parent: &K,
        endpoint: &ConnectEndpoint,
        connector: &KafkaConnector,
    ) -> ConnectorOutcome {
        let name = connector.name_any();
        debug!(%reconciliation, connector = %name, "Creating or updating connector");

        let mut disposition = match self
            .upsert(reconciliation, parent, endpoint, connector, &name)
            .await
        {
            Ok(()) => Disposition::Upserted,
            Err(e @ (Error::Config(_) | Error::NotEnabled(_))) => Disposition::Rejected(e),
            Err(e) => Disposition::Failed(e),
        };
        record_operation("upsert", &disposition);

        if let Some(e) = disposition.error() {
            warn!(%reconciliation, connector = %name, error = %e, "Error reconciling connector");
        }
        if let Err(e) = self
            .report(reconciliation, connector, disposition.error())
            .await
        {
            if !disposition.is_failure() {
                disposition = Disposition::Failed(e);
            }
        }

        ConnectorOutcome { name, disposition }
    }

    async fn upsert<K: ConnectCluster>(
        &self,
        reconciliation: &Reconciliation,
        parent: &K,
        endpoint: &ConnectEndpoint,
        connector: &KafkaConnector,
        name: &str,
    ) -> Result<()> {
        let Some(spec) = &connector.spec else {
            return Err(Error::config("spec property is required"));
        };
        if !parent.use_connector_resources() {
            return Err(Error::not_enabled(format!(
                "{} {} is not configured with annotation {}",
                K::PARENT_KIND,
                reconciliation.name(),
                USE_CONNECTOR_RESOURCES_ANNOTATION
            )));
        }

        let payload = connector_payload(spec)?;
        for key in &payload.overridden {
            warn!(
                %reconciliation,
                connector = %name,
                "Configuration parameter {} in KafkaConnector.spec.config will be ignored and the value from KafkaConnector.spec will be used instead",
                key
            );
        }

        self.call(
            &format!("Updating connector {}", name),
            self.connect_api.upsert(endpoint, name, &payload.config),
        )
        .await
    }

    /// Run a remote call under the operation timeout
    async fn call<T>(&self, what: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.operation_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::external_api(format!(
                "{} timed out after {:?}",
                what, self.operation_timeout
            ))),
        }
    }
}

fn record_operation(operation: &str, disposition: &Disposition) {
    let outcome = match disposition {
        Disposition::Deleted | Disposition::Upserted => "success",
        Disposition::Rejected(_) => "rejected",
        Disposition::Failed(_) => "failure",
    };
    metrics::CONNECTOR_OPERATIONS
        .with_label_values(&[operation, outcome])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn spec(config: serde_json::Value) -> KafkaConnectorSpec {
        KafkaConnectorSpec {
            class_name: Some("FileStreamSource".to_string()),
            tasks_max: Some(3),
            config: serde_json::from_value(config).unwrap(),
        }
    }

    #[test]
    fn payload_adds_class_and_tasks() {
        let payload = connector_payload(&spec(json!({ "file": "/tmp/in", "topic": "t" }))).unwrap();
        assert_eq!(payload.config[CONNECTOR_CLASS], "FileStreamSource");
        assert_eq!(payload.config[TASKS_MAX], 3);
        assert_eq!(payload.config["topic"], "t");
        assert!(payload.overridden.is_empty());
    }

    #[test]
    fn dedicated_fields_win_over_config() {
        let payload = connector_payload(&spec(json!({
            "connector.class": "Other",
            "tasks.max": 10,
            "topic": "t"
        })))
        .unwrap();
        assert_eq!(payload.config[CONNECTOR_CLASS], "FileStreamSource");
        assert_eq!(payload.config[TASKS_MAX], 3);
        assert_eq!(payload.config.len(), 3);
        assert_eq!(payload.overridden, vec!["connector.class", "tasks.max"]);
    }

    #[test]
    fn missing_class_is_rejected() {
        let spec = KafkaConnectorSpec {
            class_name: None,
            tasks_max: None,
            config: BTreeMap::new(),
        };
        let err = connector_payload(&spec).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn tasks_max_defaults_and_is_validated() {
        let mut defaulted = spec(json!({}));
        defaulted.tasks_max = None;
        assert_eq!(connector_payload(&defaulted).unwrap().config[TASKS_MAX], 1);

        let mut invalid = spec(json!({}));
        invalid.tasks_max = Some(0);
        assert!(connector_payload(&invalid).is_err());
    }

    #[test]
    fn aggregate_fails_when_any_operation_failed() {
        let outcome = SyncOutcome {
            outcomes: vec![
                ConnectorOutcome {
                    name: "a".to_string(),
                    disposition: Disposition::Upserted,
                },
                ConnectorOutcome {
                    name: "b".to_string(),
                    disposition: Disposition::Failed(Error::external_api("boom")),
                },
                ConnectorOutcome {
                    name: "c".to_string(),
                    disposition: Disposition::Rejected(Error::config("spec property is required")),
                },
            ],
        };
        assert!(!outcome.is_success());
        let err = outcome.into_result().unwrap_err();
        assert!(err.to_string().contains("1 of 3"));
        assert!(err.to_string().contains("b: "));
    }
}
