//! Reconcilers for Kafka Connect clusters and their connectors
//!
//! This module contains the convergence logic:
//! - Per-resource locking and pass identity
//! - Conditional status writes
//! - Cluster resolution for connectors
//! - Connector synchronization against the Connect REST API

pub mod connect;
pub mod connector_event;
pub mod connectors;
pub mod lock;
pub mod reconciliation;
pub mod resolver;
pub mod status;

pub use connect::{ConnectReconciler, PassOutcome};
pub use connector_event::{ConnectorEvent, ConnectorEventHandler, EventOutcome};
pub use connectors::{
    connector_payload, ConnectorOutcome, ConnectorPayload, ConnectorSynchronizer, Disposition,
    SyncOutcome,
};
pub use lock::{LockGuard, LockKey, ResourceLock};
pub use reconciliation::{Reconciliation, TriggerSource};
pub use resolver::{AmbiguousReference, Parent, ParentResolver, Resolution};
pub use status::{StatusDiff, StatusReconciler, StatusUpdate};
