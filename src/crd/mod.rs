//! Custom Resource Definitions for the Kafka Connect Operator

mod condition;
mod kafka_connect;
mod kafka_connect_s2i;
mod kafka_connector;

pub use condition::*;
pub use kafka_connect::*;
pub use kafka_connect_s2i::*;
pub use kafka_connector::*;

use std::fmt;

use k8s_openapi::NamespaceResourceScope;
use kube::{CustomResourceExt, Resource};
use schemars::gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Label on a KafkaConnector naming the Connect cluster it belongs to
pub const CLUSTER_LABEL: &str = "strimzi.io/cluster";

/// Annotation a Connect cluster sets to have its connectors managed through KafkaConnector resources
pub const USE_CONNECTOR_RESOURCES_ANNOTATION: &str = "strimzi.io/use-connector-resources";

/// Kinds that can host connectors
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParentKind {
    KafkaConnect,
    KafkaConnectS2I,
}

impl ParentKind {
    /// Resolution order when a connector's cluster name matches more than one kind
    pub const PRIORITY: [ParentKind; 2] = [ParentKind::KafkaConnect, ParentKind::KafkaConnectS2I];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParentKind::KafkaConnect => "KafkaConnect",
            ParentKind::KafkaConnectS2I => "KafkaConnectS2I",
        }
    }
}

impl fmt::Display for ParentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Namespaced custom resources the operator reads and writes status for
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + WithStatus
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> ManagedResource for T where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + WithStatus
        + Clone
        + fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// A Kafka Connect cluster resource that can host connectors
pub trait ConnectCluster: ManagedResource + WithStatus<Status = KafkaConnectStatus> {
    /// Kind tag used for locking and parent resolution
    const PARENT_KIND: ParentKind;

    /// Worker settings of the cluster
    fn connect_spec(&self) -> &KafkaConnectSpec;

    /// Whether the cluster opted into KafkaConnector management
    fn use_connector_resources(&self) -> bool {
        self.meta()
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(USE_CONNECTOR_RESOURCES_ANNOTATION))
            .map(|value| value.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

impl ConnectCluster for KafkaConnect {
    const PARENT_KIND: ParentKind = ParentKind::KafkaConnect;

    fn connect_spec(&self) -> &KafkaConnectSpec {
        &self.spec
    }
}

impl ConnectCluster for KafkaConnectS2I {
    const PARENT_KIND: ParentKind = ParentKind::KafkaConnectS2I;

    fn connect_spec(&self) -> &KafkaConnectSpec {
        &self.spec.connect
    }
}

/// Schema for free-form maps stored as-is by the API server
pub(crate) fn preserve_unknown_fields(_: &mut SchemaGenerator) -> Schema {
    let mut schema = SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        ..Default::default()
    };
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    Schema::Object(schema)
}

/// Generate all CRD YAML manifests
pub fn generate_crds() -> Result<Vec<String>> {
    let to_yaml = |value: serde_json::Value| {
        serde_yaml::to_string(&value).map_err(|e| crate::Error::config(e.to_string()))
    };
    Ok(vec![
        to_yaml(serde_json::to_value(KafkaConnect::crd())?)?,
        to_yaml(serde_json::to_value(KafkaConnectS2I::crd())?)?,
        to_yaml(serde_json::to_value(KafkaConnector::crd()?)?)?,
    ])
}
