//! Typed access to custom resources on the Kubernetes API
//!
//! The reconcilers only need `get`, `list` and a status write, so they talk
//! to this trait instead of `kube::Api` directly.

use std::marker::PhantomData;

use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    api::{ListParams, Patch, PatchParams},
    Api, Client, Resource, ResourceExt,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::crd::{ManagedResource, ResourceStatus, WithStatus};
use crate::error::{Error, Result};

/// Fetch, list and status-update operations for one resource kind
#[async_trait]
pub trait ResourceStore<K>: Send + Sync {
    /// Fetch a resource, `None` if it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    /// List resources, optionally restricted to a namespace and a label selector
    async fn list(&self, namespace: Option<&str>, label_selector: Option<&str>) -> Result<Vec<K>>;

    /// Write the status of `resource`, guarded by its resource version
    ///
    /// Returns [`Error::Conflict`] when the resource changed since it was read
    /// and [`Error::NotFound`] when it no longer exists.
    async fn update_status(&self, resource: &K) -> Result<()>;

    /// Whether the stored version of `resource` exposes a status subresource
    fn supports_status(&self, _resource: &K) -> bool {
        true
    }
}

/// [`ResourceStore`] backed by the Kubernetes API server
pub struct KubeStore<K> {
    client: Client,
    status_subresource: bool,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            status_subresource: true,
            _kind: PhantomData,
        }
    }

    /// Store for a CRD version that does not declare a status subresource
    pub fn without_status(client: Client) -> Self {
        Self {
            status_subresource: false,
            ..Self::new(client)
        }
    }
}

impl<K: Resource<DynamicType = ()>> KubeStore<K> {
    /// Store whose status writes follow what the installed CRD declares
    ///
    /// When the CRD cannot be read, status writes are attempted.
    pub async fn discover(client: Client) -> Self {
        let crd_name = format!("{}.{}", K::plural(&()), K::group(&()));
        let version = K::version(&());
        let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
        match crds.get_opt(&crd_name).await {
            Ok(Some(crd)) if !has_status_subresource(&crd, &version) => {
                info!(crd = %crd_name, version = %version, "CRD has no status subresource, status updates disabled");
                Self::without_status(client)
            }
            Ok(_) => Self::new(client),
            Err(e) => {
                warn!(crd = %crd_name, error = %e, "Could not read CRD, assuming a status subresource");
                Self::new(client)
            }
        }
    }
}

/// Whether `version` of `crd` is served with a status subresource
pub fn has_status_subresource(crd: &CustomResourceDefinition, version: &str) -> bool {
    crd.spec
        .versions
        .iter()
        .find(|v| v.name == version)
        .and_then(|v| v.subresources.as_ref())
        .and_then(|s| s.status.as_ref())
        .is_some()
}

/// Merge patch writing `status` guarded by `resource_version`
///
/// Optional status fields that are unset are sent as `null` so that the
/// patch clears values left by an earlier write.
pub fn status_patch<S: ResourceStatus>(
    resource_version: Option<String>,
    status: Option<&S>,
) -> Result<Value> {
    let mut status = serde_json::to_value(status)?;
    if let Value::Object(fields) = &mut status {
        for field in S::CLEARABLE_FIELDS {
            fields.entry(field.to_string()).or_insert(Value::Null);
        }
    }
    Ok(json!({
        "metadata": { "resourceVersion": resource_version },
        "status": status,
    }))
}

#[async_trait]
impl<K: ManagedResource> ResourceStore<K> for KubeStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| Error::from_kube(e, &format!("{} {}/{}", K::kind(&()), namespace, name)))
    }

    async fn list(&self, namespace: Option<&str>, label_selector: Option<&str>) -> Result<Vec<K>> {
        let api: Api<K> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let list = api
            .list(&params)
            .await
            .map_err(|e| Error::from_kube(e, &format!("{} list", K::kind(&()))))?;
        Ok(list.items)
    }

    async fn update_status(&self, resource: &K) -> Result<()> {
        let name = resource.name_any();
        let namespace = resource
            .namespace()
            .ok_or_else(|| Error::config(format!("{} {} has no namespace", K::kind(&()), name)))?;
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);

        // resourceVersion in a merge patch makes the API server reject stale writes with 409
        let patch = status_patch(resource.resource_version(), resource.status())?;
        api.patch_status(&name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| Error::from_kube(e, &format!("{} {}/{}", K::kind(&()), namespace, name)))?;
        Ok(())
    }

    fn supports_status(&self, _resource: &K) -> bool {
        self.status_subresource
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Condition, KafkaConnectStatus, KafkaConnector, KafkaConnectorStatus};

    #[test]
    fn unset_url_is_cleared_by_the_patch() {
        let status = KafkaConnectStatus {
            conditions: vec![Condition::ready()],
            observed_generation: Some(1),
            url: None,
        };
        let patch = status_patch(Some("7".to_string()), Some(&status)).unwrap();
        assert_eq!(patch["metadata"]["resourceVersion"], "7");
        assert_eq!(patch["status"]["url"], Value::Null);
        assert!(patch["status"].as_object().unwrap().contains_key("url"));
        assert_eq!(patch["status"]["observedGeneration"], 1);
        assert_eq!(patch["status"]["conditions"][0]["type"], "Ready");
    }

    #[test]
    fn set_fields_are_kept() {
        let status = KafkaConnectorStatus {
            conditions: Vec::new(),
            observed_generation: Some(3),
        };
        let patch = status_patch(None, Some(&status)).unwrap();
        assert_eq!(patch["status"]["observedGeneration"], 3);
        assert_eq!(patch["status"]["conditions"], Value::Null);
    }

    #[test]
    fn detects_status_subresource_per_version() {
        let mut crd = KafkaConnector::crd().unwrap();
        assert!(has_status_subresource(&crd, "v1alpha1"));
        assert!(!has_status_subresource(&crd, "v1beta2"));

        crd.spec.versions[0].subresources = None;
        assert!(!has_status_subresource(&crd, "v1alpha1"));
    }
}
