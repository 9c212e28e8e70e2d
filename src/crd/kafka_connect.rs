//! KafkaConnect Custom Resource Definition

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::condition::{Condition, ResourceStatus, WithStatus};

/// KafkaConnect resource specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "kafka.strimzi.io",
    version = "v1beta1",
    kind = "KafkaConnect",
    plural = "kafkaconnects",
    singular = "kafkaconnect",
    shortname = "kc",
    namespaced,
    status = "KafkaConnectStatus",
    printcolumn = r#"{"name": "Desired replicas", "type": "integer", "jsonPath": ".spec.replicas"}"#,
    printcolumn = r#"{"name": "Ready", "type": "string", "jsonPath": ".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KafkaConnectSpec {
    /// Number of Kafka Connect worker pods
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Kafka version of the workers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Container image override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Bootstrap servers of the Kafka cluster the workers join
    pub bootstrap_servers: String,

    /// Worker configuration
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schemars(schema_with = "super::preserve_unknown_fields")]
    pub config: BTreeMap<String, serde_json::Value>,
}

fn default_replicas() -> i32 {
    3
}

/// Status of a Kafka Connect cluster (shared by KafkaConnect and KafkaConnectS2I)
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KafkaConnectStatus {
    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Observed generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// URL of the Kafka Connect REST API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ResourceStatus for KafkaConnectStatus {
    const CLEARABLE_FIELDS: &'static [&'static str] = &["conditions", "observedGeneration", "url"];

    fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.conditions
    }

    fn observed_generation(&self) -> Option<i64> {
        self.observed_generation
    }
}

impl WithStatus for KafkaConnect {
    type Status = KafkaConnectStatus;

    fn status(&self) -> Option<&KafkaConnectStatus> {
        self.status.as_ref()
    }

    fn set_status(&mut self, status: KafkaConnectStatus) {
        self.status = Some(status);
    }
}
