//! Kubernetes watches feeding the dispatcher

use std::fmt::Debug;

use futures::{future::join_all, StreamExt};
use kube::{
    api::ListParams,
    runtime::{watcher, WatchStreamExt},
    Api, Client, Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::dispatcher::{Event, Trigger};
use crate::config::OperatorConfig;
use crate::crd::{ConnectCluster, KafkaConnect, KafkaConnectS2I, KafkaConnector};
use crate::reconcilers::{ConnectorEvent, TriggerSource};

/// Watch clusters and connectors in every configured namespace until shutdown
pub async fn run(
    client: Client,
    config: OperatorConfig,
    events: mpsc::Sender<Event>,
    shutdown: CancellationToken,
) {
    let mut watches = Vec::new();
    for scope in config.namespaces.scopes() {
        let scope = scope.as_deref();
        watches.push(tokio::spawn(watch(
            api::<KafkaConnect>(&client, scope),
            events.clone(),
            shutdown.clone(),
            cluster_event::<KafkaConnect>,
        )));
        if config.supports_s2i {
            watches.push(tokio::spawn(watch(
                api::<KafkaConnectS2I>(&client, scope),
                events.clone(),
                shutdown.clone(),
                cluster_event::<KafkaConnectS2I>,
            )));
        }
        watches.push(tokio::spawn(watch(
            api::<KafkaConnector>(&client, scope),
            events.clone(),
            shutdown.clone(),
            connector_event,
        )));
    }
    drop(events);

    for result in join_all(watches).await {
        if let Err(e) = result {
            error!(error = %e, "Watch task panicked");
        }
    }
}

fn api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Whole-resource pass for a changed or deleted cluster
fn cluster_event<K: ConnectCluster>(event: watcher::Event<K>) -> Option<Event> {
    let resource = match event {
        watcher::Event::Apply(resource)
        | watcher::Event::InitApply(resource)
        | watcher::Event::Delete(resource) => resource,
        watcher::Event::Init | watcher::Event::InitDone => return None,
    };
    Some(Event::Trigger(Trigger::new(
        TriggerSource::Watch,
        K::PARENT_KIND,
        resource.namespace()?,
        resource.name_any(),
    )))
}

fn connector_event(event: watcher::Event<KafkaConnector>) -> Option<Event> {
    match event {
        watcher::Event::Apply(c) | watcher::Event::InitApply(c) => {
            Some(Event::Connector(ConnectorEvent::Apply(c)))
        }
        watcher::Event::Delete(c) => Some(Event::Connector(ConnectorEvent::Delete(c))),
        watcher::Event::Init | watcher::Event::InitDone => None,
    }
}

async fn watch<K, F>(
    api: Api<K>,
    events: mpsc::Sender<Event>,
    shutdown: CancellationToken,
    to_event: F,
) where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + 'static,
    F: Fn(watcher::Event<K>) -> Option<Event> + Send + 'static,
{
    let kind = K::kind(&()).to_string();

    // A missing CRD is not fatal for the others
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!(kind = %kind, error = %e, "{} CRD not installed, not watching it", kind);
        return;
    }
    info!(kind = %kind, "Starting watch");

    let stream = watcher(api, watcher::Config::default()).default_backoff();
    tokio::pin!(stream);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            item = stream.next() => match item {
                Some(Ok(event)) => {
                    let Some(event) = to_event(event) else {
                        continue;
                    };
                    if events.send(event).await.is_err() {
                        debug!(kind = %kind, "Dispatcher gone, stopping watch");
                        break;
                    }
                }
                Some(Err(e)) => warn!(kind = %kind, error = %e, "Watch error, retrying"),
                None => break,
            },
        }
    }
    info!(kind = %kind, "Watch stopped");
}
