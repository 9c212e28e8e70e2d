//! Kafka Connect REST API client

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};

/// Port the Kafka Connect REST API listens on
pub const REST_API_PORT: u16 = 8083;

/// Base URL of one Connect cluster's REST API
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectEndpoint {
    base_url: String,
}

impl ConnectEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Endpoint of the `<name>-connect-api` service of a Connect cluster
    pub fn for_cluster(name: &str, namespace: &str) -> Self {
        Self::new(format!(
            "http://{}.{}.svc:{}",
            service_name(name),
            namespace,
            REST_API_PORT
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::config(format!("Invalid Connect URL '{}': {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::config(format!("Connect URL '{}' cannot have a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

impl fmt::Display for ConnectEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url)
    }
}

/// Name of the REST API service of a Connect cluster
pub fn service_name(cluster: &str) -> String {
    format!("{}-connect-api", cluster)
}

/// Operations on the connectors of a running Connect cluster
#[async_trait]
pub trait ConnectApi: Send + Sync {
    /// Names of the connectors currently running
    async fn list(&self, endpoint: &ConnectEndpoint) -> Result<Vec<String>>;

    /// Create the connector or replace its configuration
    async fn upsert(
        &self,
        endpoint: &ConnectEndpoint,
        name: &str,
        config: &Map<String, Value>,
    ) -> Result<()>;

    /// Remove the connector; a connector that does not exist is not an error
    async fn delete(&self, endpoint: &ConnectEndpoint, name: &str) -> Result<()>;
}

/// Error body returned by the Connect REST API
#[derive(Deserialize)]
struct RestError {
    #[serde(default)]
    error_code: Option<u16>,
    message: String,
}

/// [`ConnectApi`] over HTTP
#[derive(Clone)]
pub struct HttpConnectApi {
    client: reqwest::Client,
}

impl HttpConnectApi {
    /// Create a client whose requests fail after `request_timeout`
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn failure(action: &str, response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<RestError>(&body) {
            Ok(err) => format!("{} (error_code {})", err.message, err.error_code.unwrap_or(status.as_u16())),
            Err(_) if body.is_empty() => status.to_string(),
            Err(_) => body,
        };
        Error::external_api(format!("{} failed with {}: {}", action, status, detail))
    }
}

#[async_trait]
impl ConnectApi for HttpConnectApi {
    async fn list(&self, endpoint: &ConnectEndpoint) -> Result<Vec<String>> {
        let url = endpoint.url(&["connectors"])?;
        debug!(url = %url, "Listing connectors");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::external_api(format!("GET {}/connectors: {}", endpoint, e)))?;
        if !response.status().is_success() {
            return Err(Self::failure("Listing connectors", response).await);
        }
        Ok(response.json::<Vec<String>>().await?)
    }

    async fn upsert(
        &self,
        endpoint: &ConnectEndpoint,
        name: &str,
        config: &Map<String, Value>,
    ) -> Result<()> {
        let url = endpoint.url(&["connectors", name, "config"])?;
        debug!(url = %url, connector = name, "Creating or updating connector");
        let response = self
            .client
            .put(url)
            .json(config)
            .send()
            .await
            .map_err(|e| Error::external_api(format!("PUT connector {}: {}", name, e)))?;
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(()),
            _ => Err(Self::failure(&format!("Updating connector {}", name), response).await),
        }
    }

    async fn delete(&self, endpoint: &ConnectEndpoint, name: &str) -> Result<()> {
        let url = endpoint.url(&["connectors", name])?;
        debug!(url = %url, connector = name, "Deleting connector");
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|e| Error::external_api(format!("DELETE connector {}: {}", name, e)))?;
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            _ => Err(Self::failure(&format!("Deleting connector {}", name), response).await),
        }
    }
}
