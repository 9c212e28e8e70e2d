//! In-memory collaborators shared by the integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use serde_json::{Map, Value};

use kafka_connect_operator::adapters::{ConnectApi, ConnectEndpoint, ResourceStore};
use kafka_connect_operator::crd::{
    Condition, KafkaConnect, KafkaConnectS2I, KafkaConnectS2ISpec, KafkaConnectSpec,
    KafkaConnector, KafkaConnectorSpec, ManagedResource, WithStatus, CONDITION_NOT_READY,
    USE_CONNECTOR_RESOURCES_ANNOTATION,
};
use kafka_connect_operator::{Error, Result};

pub const NAMESPACE: &str = "kafka";

/// Kubernetes API stand-in honouring resource versions
pub struct FakeStore<K> {
    objects: Mutex<BTreeMap<(String, String), K>>,
    pending_conflicts: AtomicUsize,
    status_writes: AtomicUsize,
    supports_status: AtomicBool,
}

impl<K: ManagedResource> FakeStore<K> {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            pending_conflicts: AtomicUsize::new(0),
            status_writes: AtomicUsize::new(0),
            supports_status: AtomicBool::new(true),
        }
    }

    pub fn with(objects: impl IntoIterator<Item = K>) -> Self {
        let store = Self::new();
        for object in objects {
            store.insert(object);
        }
        store
    }

    pub fn insert(&self, mut object: K) {
        if object.meta().resource_version.is_none() {
            object.meta_mut().resource_version = Some("1".to_string());
        }
        let key = (object.namespace().unwrap_or_default(), object.name_any());
        self.objects.lock().unwrap().insert(key, object);
    }

    pub fn remove(&self, namespace: &str, name: &str) {
        self.objects
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
    }

    pub fn stored(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Make the next `count` status writes fail as if another writer got there first
    pub fn inject_conflicts(&self, count: usize) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    pub fn set_supports_status(&self, supported: bool) {
        self.supports_status.store(supported, Ordering::SeqCst);
    }

    /// Successful status writes so far
    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }
}

fn next_version(object: &mut impl Resource) {
    let current: u64 = object
        .meta()
        .resource_version
        .as_deref()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    object.meta_mut().resource_version = Some((current + 1).to_string());
}

fn matches_selector(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    selector.split(',').all(|term| match term.split_once('=') {
        Some((key, value)) => labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
        None => labels.contains_key(term.trim()),
    })
}

#[async_trait]
impl<K: ManagedResource> ResourceStore<K> for FakeStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        Ok(self.stored(namespace, name))
    }

    async fn list(&self, namespace: Option<&str>, label_selector: Option<&str>) -> Result<Vec<K>> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter(|((ns, _), _)| namespace.map_or(true, |wanted| wanted == ns))
            .filter(|(_, object)| {
                label_selector.map_or(true, |selector| matches_selector(object.labels(), selector))
            })
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn update_status(&self, resource: &K) -> Result<()> {
        let key = (resource.namespace().unwrap_or_default(), resource.name_any());
        let mut objects = self.objects.lock().unwrap();
        let Some(stored) = objects.get_mut(&key) else {
            return Err(Error::not_found(format!("{}/{} not found", key.0, key.1)));
        };

        if self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            next_version(stored);
            return Err(Error::conflict("the object has been modified"));
        }
        if stored.meta().resource_version != resource.meta().resource_version {
            return Err(Error::conflict("resource version mismatch"));
        }

        let mut updated = stored.clone();
        if let Some(status) = resource.status() {
            updated.set_status(status.clone());
        }
        next_version(&mut updated);
        *stored = updated;
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn supports_status(&self, _resource: &K) -> bool {
        self.supports_status.load(Ordering::SeqCst)
    }
}

/// Call recorded by [`FakeConnectApi`]
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Call {
    List,
    Upsert(String),
    Delete(String),
}

/// Kafka Connect REST API stand-in for a single cluster
#[derive(Default)]
pub struct FakeConnectApi {
    running: Mutex<BTreeMap<String, Map<String, Value>>>,
    calls: Mutex<Vec<Call>>,
    failing: Mutex<BTreeSet<String>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeConnectApi {
    pub fn with_running(names: &[&str]) -> Self {
        let api = Self::default();
        {
            let mut running = api.running.lock().unwrap();
            for name in names {
                running.insert(name.to_string(), Map::new());
            }
        }
        api
    }

    pub fn running(&self) -> BTreeSet<String> {
        self.running.lock().unwrap().keys().cloned().collect()
    }

    pub fn config_of(&self, name: &str) -> Option<Map<String, Value>> {
        self.running.lock().unwrap().get(name).cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Upserts and deletes, sorted
    pub fn mutations(&self) -> Vec<Call> {
        let mut calls: Vec<Call> = self
            .calls()
            .into_iter()
            .filter(|c| *c != Call::List)
            .collect();
        calls.sort();
        calls
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Make every upsert and delete of `name` fail
    pub fn fail(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    /// Delay every mutation by `delay`
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    async fn mutate(&self, call: Call, name: &str) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(name) {
            return Err(Error::external_api(format!("connector {} rejected", name)));
        }
        Ok(())
    }
}

#[async_trait]
impl ConnectApi for FakeConnectApi {
    async fn list(&self, _endpoint: &ConnectEndpoint) -> Result<Vec<String>> {
        self.calls.lock().unwrap().push(Call::List);
        Ok(self.running().into_iter().collect())
    }

    async fn upsert(
        &self,
        _endpoint: &ConnectEndpoint,
        name: &str,
        config: &Map<String, Value>,
    ) -> Result<()> {
        self.mutate(Call::Upsert(name.to_string()), name).await?;
        self.running
            .lock()
            .unwrap()
            .insert(name.to_string(), config.clone());
        Ok(())
    }

    async fn delete(&self, _endpoint: &ConnectEndpoint, name: &str) -> Result<()> {
        self.mutate(Call::Delete(name.to_string()), name).await?;
        self.running.lock().unwrap().remove(name);
        Ok(())
    }
}

fn connect_spec() -> KafkaConnectSpec {
    KafkaConnectSpec {
        replicas: 1,
        version: None,
        image: None,
        bootstrap_servers: "my-cluster-kafka-bootstrap:9092".to_string(),
        config: BTreeMap::new(),
    }
}

fn cluster_metadata(name: &str, use_connector_resources: bool) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(NAMESPACE.to_string()),
        generation: Some(1),
        annotations: use_connector_resources.then(|| {
            BTreeMap::from([(USE_CONNECTOR_RESOURCES_ANNOTATION.to_string(), "true".to_string())])
        }),
        ..Default::default()
    }
}

pub fn connect(name: &str, use_connector_resources: bool) -> KafkaConnect {
    let mut connect = KafkaConnect::new(name, connect_spec());
    connect.metadata = cluster_metadata(name, use_connector_resources);
    connect
}

pub fn connect_s2i(name: &str, use_connector_resources: bool) -> KafkaConnectS2I {
    let mut connect = KafkaConnectS2I::new(
        name,
        KafkaConnectS2ISpec {
            connect: connect_spec(),
            insecure_source_repository: false,
        },
    );
    connect.metadata = cluster_metadata(name, use_connector_resources);
    connect
}

pub fn connector_spec(class_name: &str) -> KafkaConnectorSpec {
    KafkaConnectorSpec {
        class_name: Some(class_name.to_string()),
        tasks_max: Some(1),
        config: BTreeMap::from([("topic".to_string(), Value::from("my-topic"))]),
    }
}

/// Connector labelled for `cluster` at generation 1
pub fn connector(name: &str, cluster: Option<&str>, spec: Option<KafkaConnectorSpec>) -> KafkaConnector {
    let mut connector = KafkaConnector::new(name, NAMESPACE, cluster, spec);
    connector.metadata.generation = Some(1);
    connector
}

/// The single condition on a stored connector
pub fn connector_condition(store: &FakeStore<KafkaConnector>, name: &str) -> Condition {
    let stored = store.stored(NAMESPACE, name).expect("connector exists");
    let status = stored.status.expect("connector has a status");
    assert_eq!(status.conditions.len(), 1);
    status.conditions[0].clone()
}

/// Reason of a NotReady condition, `None` for Ready
pub fn failure_reason(condition: &Condition) -> Option<String> {
    (condition.type_ == CONDITION_NOT_READY).then(|| condition.reason.clone().unwrap_or_default())
}
