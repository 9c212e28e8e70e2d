//! Integration tests for conditional status writes

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};

use common::*;
use kafka_connect_operator::crd::{
    Condition, KafkaConnect, KafkaConnectStatus, ParentKind, CONDITION_READY,
};
use kafka_connect_operator::reconcilers::{
    Reconciliation, StatusReconciler, StatusUpdate, TriggerSource,
};
use kafka_connect_operator::Error;

const CLUSTER: &str = "my-connect";

fn reconciliation() -> Reconciliation {
    Reconciliation::new(TriggerSource::Watch, ParentKind::KafkaConnect, NAMESPACE, CLUSTER)
}

fn status(condition: Condition, generation: i64) -> KafkaConnectStatus {
    KafkaConnectStatus {
        conditions: vec![condition],
        observed_generation: Some(generation),
        url: Some("http://my-connect-connect-api.kafka.svc:8083".to_string()),
    }
}

fn store_with(current: Option<KafkaConnectStatus>) -> Arc<FakeStore<KafkaConnect>> {
    let mut resource = connect(CLUSTER, true);
    resource.status = current;
    Arc::new(FakeStore::with([resource]))
}

fn ready_since(minutes: i64) -> Condition {
    let mut condition = Condition::ready();
    condition.last_transition_time = Utc::now() - Duration::minutes(minutes);
    condition
}

#[tokio::test]
async fn timestamp_only_difference_is_not_written() {
    let store = store_with(Some(status(ready_since(10), 1)));
    let reconciler = StatusReconciler::<KafkaConnect>::new(store.clone());

    let update = reconciler
        .reconcile(&reconciliation(), NAMESPACE, CLUSTER, status(Condition::ready(), 1))
        .await
        .unwrap();

    assert_eq!(update, StatusUpdate::Unchanged);
    assert_eq!(store.status_writes(), 0);
}

#[tokio::test]
async fn unchanged_condition_keeps_its_transition_time() {
    let previous = ready_since(10);
    let since = previous.last_transition_time;
    let store = store_with(Some(status(previous, 1)));
    let reconciler = StatusReconciler::<KafkaConnect>::new(store.clone());

    let update = reconciler
        .reconcile(&reconciliation(), NAMESPACE, CLUSTER, status(Condition::ready(), 2))
        .await
        .unwrap();

    assert_eq!(update, StatusUpdate::Updated);
    let written = store.stored(NAMESPACE, CLUSTER).unwrap().status.unwrap();
    assert_eq!(written.observed_generation, Some(2));
    assert_eq!(written.conditions[0].type_, CONDITION_READY);
    assert_eq!(written.conditions[0].last_transition_time, since);
}

#[tokio::test]
async fn changed_condition_gets_a_new_transition_time() {
    let previous = ready_since(10);
    let since = previous.last_transition_time;
    let store = store_with(Some(status(previous, 1)));
    let reconciler = StatusReconciler::<KafkaConnect>::new(store.clone());

    let failed = Condition::not_ready(&Error::external_api("unreachable"));
    reconciler
        .reconcile(&reconciliation(), NAMESPACE, CLUSTER, status(failed, 1))
        .await
        .unwrap();

    let written = store.stored(NAMESPACE, CLUSTER).unwrap().status.unwrap();
    assert_eq!(written.conditions[0].reason.as_deref(), Some("ExternalApiError"));
    assert!(written.conditions[0].last_transition_time > since);
}

#[tokio::test]
async fn first_status_is_written() {
    let store = store_with(None);
    let reconciler = StatusReconciler::<KafkaConnect>::new(store.clone());

    let update = reconciler
        .reconcile(&reconciliation(), NAMESPACE, CLUSTER, status(Condition::ready(), 1))
        .await
        .unwrap();

    assert_eq!(update, StatusUpdate::Updated);
    assert_eq!(store.status_writes(), 1);
}

#[tokio::test]
async fn single_conflict_is_retried() {
    let store = store_with(None);
    store.inject_conflicts(1);
    let reconciler = StatusReconciler::<KafkaConnect>::new(store.clone());

    let update = reconciler
        .reconcile(&reconciliation(), NAMESPACE, CLUSTER, status(Condition::ready(), 1))
        .await
        .unwrap();

    assert_eq!(update, StatusUpdate::Updated);
    assert_eq!(store.status_writes(), 1);
}

#[tokio::test]
async fn repeated_conflict_is_surfaced() {
    let store = store_with(None);
    store.inject_conflicts(2);
    let reconciler = StatusReconciler::<KafkaConnect>::new(store.clone());

    let err = reconciler
        .reconcile(&reconciliation(), NAMESPACE, CLUSTER, status(Condition::ready(), 1))
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(err.reason(), "ConflictError");
    assert_eq!(store.status_writes(), 0);
}

#[tokio::test]
async fn deleted_resource_is_benign() {
    let store = store_with(None);
    store.remove(NAMESPACE, CLUSTER);
    let reconciler = StatusReconciler::<KafkaConnect>::new(store.clone());

    let update = reconciler
        .reconcile(&reconciliation(), NAMESPACE, CLUSTER, status(Condition::ready(), 1))
        .await
        .unwrap();

    assert_eq!(update, StatusUpdate::ResourceGone);
}

#[tokio::test]
async fn resource_without_status_subresource_is_skipped() {
    let store = store_with(None);
    store.set_supports_status(false);
    let reconciler = StatusReconciler::<KafkaConnect>::new(store.clone());

    let update = reconciler
        .reconcile(&reconciliation(), NAMESPACE, CLUSTER, status(Condition::ready(), 1))
        .await
        .unwrap();

    assert_eq!(update, StatusUpdate::Unsupported);
    assert_eq!(store.status_writes(), 0);
}
