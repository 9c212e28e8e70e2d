//! Adapters for the external collaborators of the reconcilers
//!
//! - Kubernetes API access for custom resources
//! - The Kafka Connect REST API
//! - Desired state derived from a cluster specification

mod connect_api;
mod desired_state;
mod kube_store;

pub use connect_api::*;
pub use desired_state::*;
pub use kube_store::*;
