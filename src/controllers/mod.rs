//! Event sources and dispatch for the Kafka Connect reconcilers
//!
//! Watches and the periodic timer turn cluster activity into [`Event`]s on a
//! channel. A single dispatcher consumes the channel and runs each event in
//! its own task.

mod dispatcher;
mod timer;
mod watch;

pub use dispatcher::{dispatch, run as run_dispatcher, Event, Trigger};
pub use timer::{enqueue_all, run as run_timer};
pub use watch::run as run_watchers;

use std::sync::Arc;

use kube::Client;

use crate::adapters::{
    ConnectApi, ConnectClusterModel, HttpConnectApi, KubeStore, ResourceStore,
};
use crate::config::OperatorConfig;
use crate::crd::{KafkaConnect, KafkaConnectS2I, KafkaConnector};
use crate::error::Result;
use crate::reconcilers::{
    ConnectReconciler, ConnectorEventHandler, ConnectorSynchronizer, ParentResolver, ResourceLock,
};

/// Shared context for the dispatcher and event sources
pub struct Context {
    pub config: OperatorConfig,
    pub connect_store: Arc<dyn ResourceStore<KafkaConnect>>,
    pub connect_s2i_store: Option<Arc<dyn ResourceStore<KafkaConnectS2I>>>,
    pub connect: ConnectReconciler<KafkaConnect>,
    /// `None` on platforms without KafkaConnectS2I
    pub connect_s2i: Option<ConnectReconciler<KafkaConnectS2I>>,
    pub connectors: ConnectorEventHandler,
    pub locks: ResourceLock,
}

impl Context {
    /// Create a context talking to the Kubernetes API and Kafka Connect over HTTP
    pub async fn new(client: Client, config: OperatorConfig) -> Result<Self> {
        let connect_api = Arc::new(HttpConnectApi::new(config.operation_timeout)?);
        let connect_s2i_store = if config.supports_s2i {
            Some(Arc::new(KubeStore::<KafkaConnectS2I>::discover(client.clone()).await)
                as Arc<dyn ResourceStore<KafkaConnectS2I>>)
        } else {
            None
        };
        let connect_store = KubeStore::<KafkaConnect>::discover(client.clone()).await;
        let connector_store = KubeStore::<KafkaConnector>::discover(client).await;

        Ok(Self::from_parts(
            config,
            Arc::new(connect_store),
            connect_s2i_store,
            Arc::new(connector_store),
            connect_api,
        ))
    }

    /// Wire the reconcilers from explicit collaborators
    pub fn from_parts(
        config: OperatorConfig,
        connect_store: Arc<dyn ResourceStore<KafkaConnect>>,
        connect_s2i_store: Option<Arc<dyn ResourceStore<KafkaConnectS2I>>>,
        connector_store: Arc<dyn ResourceStore<KafkaConnector>>,
        connect_api: Arc<dyn ConnectApi>,
    ) -> Self {
        let locks = ResourceLock::new();
        let model = Arc::new(ConnectClusterModel);
        let resolver = Arc::new(ParentResolver::new(
            connect_store.clone(),
            connect_s2i_store.clone(),
        ));
        let synchronizer = Arc::new(ConnectorSynchronizer::new(
            connect_api,
            connector_store,
            config.operation_timeout,
        ));

        let connect = ConnectReconciler::new(
            connect_store.clone(),
            locks.clone(),
            synchronizer.clone(),
            resolver.clone(),
            model.clone(),
            config.lock_timeout,
        );
        let connect_s2i = connect_s2i_store.clone().map(|store| {
            ConnectReconciler::new(
                store,
                locks.clone(),
                synchronizer.clone(),
                resolver.clone(),
                model.clone(),
                config.lock_timeout,
            )
        });
        let connectors = ConnectorEventHandler::new(
            resolver,
            synchronizer,
            locks.clone(),
            model.clone(),
            model,
            config.lock_timeout,
        );

        Self {
            config,
            connect_store,
            connect_s2i_store,
            connect,
            connect_s2i,
            connectors,
            locks,
        }
    }
}
