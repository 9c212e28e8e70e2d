//! Desired state derived from a Connect cluster specification
//!
//! Rendering of the worker Deployment, Services and volumes is handled
//! elsewhere; the reconcilers only need the values below.

use kube::ResourceExt;

use super::connect_api::ConnectEndpoint;
use crate::crd::ConnectCluster;
use crate::error::{Error, Result};

/// What a reconciliation pass needs to know about the desired cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesiredState {
    /// Where the cluster's REST API is reachable
    pub endpoint: ConnectEndpoint,
    /// URL published in the cluster status
    pub url: String,
}

/// Pure mapping from a cluster resource to its desired state
pub trait DesiredStateBuilder<K>: Send + Sync {
    fn build(&self, resource: &K) -> Result<DesiredState>;
}

/// Default builder for KafkaConnect and KafkaConnectS2I
#[derive(Clone, Copy, Debug, Default)]
pub struct ConnectClusterModel;

impl<K: ConnectCluster> DesiredStateBuilder<K> for ConnectClusterModel {
    fn build(&self, resource: &K) -> Result<DesiredState> {
        let name = resource.name_any();
        let namespace = resource
            .namespace()
            .ok_or_else(|| Error::config(format!("{} {} has no namespace", K::PARENT_KIND, name)))?;

        let spec = resource.connect_spec();
        if spec.bootstrap_servers.trim().is_empty() {
            return Err(Error::config("spec.bootstrapServers must not be empty"));
        }
        if spec.replicas < 0 {
            return Err(Error::config(format!(
                "spec.replicas must not be negative, got {}",
                spec.replicas
            )));
        }

        let endpoint = ConnectEndpoint::for_cluster(&name, &namespace);
        Ok(DesiredState {
            url: endpoint.base_url().to_string(),
            endpoint,
        })
    }
}
