//! Periodic full reconciliation

use std::sync::Arc;

use kube::ResourceExt;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dispatcher::{Event, Trigger};
use super::Context;
use crate::adapters::ResourceStore;
use crate::crd::ConnectCluster;
use crate::error::Result;
use crate::metrics;
use crate::reconcilers::TriggerSource;

/// Enqueue a timer pass for every cluster on each interval tick
pub async fn run(ctx: Arc<Context>, events: mpsc::Sender<Event>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(ctx.config.full_reconciliation_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        interval_ms = ctx.config.full_reconciliation_interval.as_millis() as u64,
        "Periodic reconciliation started"
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                if events.is_closed() {
                    break;
                }
                match enqueue_all(&ctx, &events).await {
                    Ok(count) => debug!(count, "Enqueued periodic reconciliations"),
                    Err(e) => warn!(error = %e, "Failed to list clusters for periodic reconciliation"),
                }
            }
        }
    }
}

/// List every cluster in the watched namespaces and enqueue a timer pass for each
pub async fn enqueue_all(ctx: &Context, events: &mpsc::Sender<Event>) -> Result<usize> {
    let mut count = enqueue_kind(ctx, ctx.connect_store.as_ref(), events).await?;
    if let Some(store) = &ctx.connect_s2i_store {
        count += enqueue_kind(ctx, store.as_ref(), events).await?;
    }
    Ok(count)
}

async fn enqueue_kind<K: ConnectCluster>(
    ctx: &Context,
    store: &dyn ResourceStore<K>,
    events: &mpsc::Sender<Event>,
) -> Result<usize> {
    let mut resources = Vec::new();
    for scope in ctx.config.namespaces.scopes() {
        resources.extend(store.list(scope.as_deref(), None).await?);
    }
    metrics::MANAGED_RESOURCES
        .with_label_values(&[K::PARENT_KIND.as_str()])
        .set(resources.len() as f64);

    let mut sent = 0;
    for resource in resources {
        let Some(namespace) = resource.namespace() else {
            continue;
        };
        let trigger = Trigger::new(
            TriggerSource::Timer,
            K::PARENT_KIND,
            namespace,
            resource.name_any(),
        );
        if events.send(Event::Trigger(trigger)).await.is_err() {
            break;
        }
        sent += 1;
    }
    Ok(sent)
}
