//! KafkaConnector Custom Resource Definition
//!
//! Unlike the cluster resources this type is not derived: a connector whose
//! `spec` is missing must still deserialize so that it can be reported as
//! invalid, which the generated `CustomResource` struct does not allow.

use std::borrow::Cow;
use std::collections::BTreeMap;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::condition::{Condition, ResourceStatus, WithStatus};
use super::CLUSTER_LABEL;
use crate::error::Result;

const GROUP: &str = "kafka.strimzi.io";
const VERSION: &str = "v1alpha1";
const KIND: &str = "KafkaConnector";
const PLURAL: &str = "kafkaconnectors";

/// KafkaConnector resource
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KafkaConnector {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_kind")]
    pub kind: String,

    pub metadata: ObjectMeta,

    /// Desired connector; `None` when the resource was created without one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<KafkaConnectorSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<KafkaConnectorStatus>,
}

fn default_api_version() -> String {
    format!("{}/{}", GROUP, VERSION)
}

fn default_kind() -> String {
    KIND.to_string()
}

/// KafkaConnector specification
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KafkaConnectorSpec {
    /// Connector implementation class
    #[serde(rename = "class", skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,

    /// Maximum number of tasks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks_max: Option<i32>,

    /// Free-form connector configuration
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, serde_json::Value>,
}

/// KafkaConnector status
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KafkaConnectorStatus {
    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Observed generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl KafkaConnector {
    /// Build a connector in `namespace` attached to the cluster named `cluster`
    pub fn new(
        name: &str,
        namespace: &str,
        cluster: Option<&str>,
        spec: Option<KafkaConnectorSpec>,
    ) -> Self {
        let labels = cluster.map(|c| BTreeMap::from([(CLUSTER_LABEL.to_string(), c.to_string())]));
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels,
                ..Default::default()
            },
            spec,
            status: None,
        }
    }

    /// Name of the Connect cluster this connector belongs to
    pub fn cluster_label(&self) -> Option<&str> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(CLUSTER_LABEL))
            .map(String::as_str)
    }

    /// CustomResourceDefinition for KafkaConnector
    pub fn crd() -> Result<CustomResourceDefinition> {
        let condition = json!({
            "type": "object",
            "properties": {
                "type": { "type": "string" },
                "status": { "type": "string" },
                "reason": { "type": "string" },
                "message": { "type": "string" },
                "lastTransitionTime": { "type": "string", "format": "date-time" }
            }
        });
        let crd = json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": { "name": format!("{}.{}", PLURAL, GROUP) },
            "spec": {
                "group": GROUP,
                "scope": "Namespaced",
                "names": {
                    "kind": KIND,
                    "listKind": format!("{}List", KIND),
                    "plural": PLURAL,
                    "singular": "kafkaconnector",
                    "shortNames": ["kctr"]
                },
                "versions": [{
                    "name": VERSION,
                    "served": true,
                    "storage": true,
                    "subresources": { "status": {} },
                    "additionalPrinterColumns": [
                        { "name": "Cluster", "type": "string", "jsonPath": ".metadata.labels.strimzi\\.io/cluster" },
                        { "name": "Connector class", "type": "string", "jsonPath": ".spec.class" },
                        { "name": "Max Tasks", "type": "integer", "jsonPath": ".spec.tasksMax" }
                    ],
                    "schema": {
                        "openAPIV3Schema": {
                            "type": "object",
                            "properties": {
                                "spec": {
                                    "type": "object",
                                    "properties": {
                                        "class": { "type": "string" },
                                        "tasksMax": { "type": "integer", "minimum": 1 },
                                        "config": {
                                            "type": "object",
                                            "x-kubernetes-preserve-unknown-fields": true
                                        }
                                    }
                                },
                                "status": {
                                    "type": "object",
                                    "properties": {
                                        "conditions": { "type": "array", "items": condition },
                                        "observedGeneration": { "type": "integer" }
                                    }
                                }
                            }
                        }
                    }
                }]
            }
        });
        Ok(serde_json::from_value(crd)?)
    }
}

impl Resource for KafkaConnector {
    type DynamicType = ();
    type Scope = NamespaceResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(KIND)
    }

    fn group(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(GROUP)
    }

    fn version(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(VERSION)
    }

    fn plural(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(PLURAL)
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl ResourceStatus for KafkaConnectorStatus {
    const CLEARABLE_FIELDS: &'static [&'static str] = &["conditions", "observedGeneration"];

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

impl WithStatus for KafkaConnector {
    type Status = KafkaConnectorStatus;

    fn status(&self) -> Option<&KafkaConnectorStatus> {
        self.status.as_ref()
    }

    fn set_status(&mut self, status: KafkaConnectorStatus) {
        self.status = Some(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_without_spec() {
        let connector: KafkaConnector = serde_json::from_value(json!({
            "apiVersion": "kafka.strimzi.io/v1alpha1",
            "kind": "KafkaConnector",
            "metadata": {
                "name": "orphan",
                "namespace": "kafka",
                "labels": { "strimzi.io/cluster": "my-connect" }
            }
        }))
        .unwrap();
        assert!(connector.spec.is_none());
        assert_eq!(connector.cluster_label(), Some("my-connect"));
    }

    #[test]
    fn spec_uses_class_field_name() {
        let spec: KafkaConnectorSpec = serde_json::from_value(json!({
            "class": "org.apache.kafka.connect.file.FileStreamSourceConnector",
            "tasksMax": 2,
            "config": { "file": "/tmp/in", "topic": "lines" }
        }))
        .unwrap();
        assert_eq!(
            spec.class_name.as_deref(),
            Some("org.apache.kafka.connect.file.FileStreamSourceConnector")
        );
        assert_eq!(spec.tasks_max, Some(2));
        assert_eq!(spec.config["topic"], "lines");
    }

    #[test]
    fn generates_crd() {
        let crd = KafkaConnector::crd().unwrap();
        assert_eq!(crd.metadata.name.as_deref(), Some("kafkaconnectors.kafka.strimzi.io"));
        assert_eq!(crd.spec.versions[0].name, "v1alpha1");
        assert_eq!(KafkaConnector::api_version(&()), "kafka.strimzi.io/v1alpha1");
    }
}
