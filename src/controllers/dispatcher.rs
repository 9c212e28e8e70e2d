//! Single consumer of the event channel
//!
//! Every event runs in its own task. Events for the same cluster may run
//! concurrently; the per-resource lock serializes them.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use super::Context;
use crate::crd::ParentKind;
use crate::reconcilers::{ConnectorEvent, Reconciliation, TriggerSource};

/// Request for a whole-resource pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trigger {
    pub source: TriggerSource,
    pub kind: ParentKind,
    pub namespace: String,
    pub name: String,
}

impl Trigger {
    pub fn new(
        source: TriggerSource,
        kind: ParentKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            source,
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

/// Work item consumed by the dispatcher
#[derive(Clone, Debug)]
pub enum Event {
    Trigger(Trigger),
    Connector(ConnectorEvent),
}

/// Consume events until shutdown or until every sender is gone
///
/// In-flight passes are awaited before returning.
pub async fn run(ctx: Arc<Context>, mut events: mpsc::Receiver<Event>, shutdown: CancellationToken) {
    let tracker = TaskTracker::new();
    info!("Dispatcher started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => {
                    let ctx = ctx.clone();
                    tracker.spawn(async move { dispatch(&ctx, event).await });
                }
                None => break,
            },
        }
    }

    tracker.close();
    debug!(in_flight = tracker.len(), "Waiting for in-flight passes");
    tracker.wait().await;
    info!("Dispatcher stopped");
}

/// Handle one event to completion
pub async fn dispatch(ctx: &Context, event: Event) {
    match event {
        Event::Trigger(trigger) => {
            let reconciliation =
                Reconciliation::new(trigger.source, trigger.kind, trigger.namespace, trigger.name);
            match trigger.kind {
                ParentKind::KafkaConnect => {
                    ctx.connect.reconcile(reconciliation).await;
                }
                ParentKind::KafkaConnectS2I => match &ctx.connect_s2i {
                    Some(reconciler) => {
                        reconciler.reconcile(reconciliation).await;
                    }
                    None => {
                        debug!(%reconciliation, "KafkaConnectS2I is not supported, ignoring");
                    }
                },
            }
        }
        Event::Connector(event) => {
            ctx.connectors.handle(event).await;
        }
    }
}
