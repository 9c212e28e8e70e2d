//! KafkaConnectS2I Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::condition::WithStatus;
use super::kafka_connect::{KafkaConnectSpec, KafkaConnectStatus};

/// KafkaConnectS2I resource specification
///
/// A Kafka Connect cluster whose worker image is built with Source-to-Image.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "kafka.strimzi.io",
    version = "v1beta1",
    kind = "KafkaConnectS2I",
    plural = "kafkaconnects2is",
    singular = "kafkaconnects2i",
    shortname = "kcs2i",
    namespaced,
    status = "KafkaConnectStatus",
    printcolumn = r#"{"name": "Desired replicas", "type": "integer", "jsonPath": ".spec.replicas"}"#,
    printcolumn = r#"{"name": "Ready", "type": "string", "jsonPath": ".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KafkaConnectS2ISpec {
    /// Worker settings shared with KafkaConnect
    #[serde(flatten)]
    pub connect: KafkaConnectSpec,

    /// Mark the source image repository as insecure
    #[serde(default)]
    pub insecure_source_repository: bool,
}

impl WithStatus for KafkaConnectS2I {
    type Status = KafkaConnectStatus;

    fn status(&self) -> Option<&KafkaConnectStatus> {
        self.status.as_ref()
    }

    fn set_status(&mut self, status: KafkaConnectStatus) {
        self.status = Some(status);
    }
}
