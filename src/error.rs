//! Error types for the Kafka Connect Operator

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Operator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Missing or invalid required field, missing parent-reference label
    #[error("Configuration error: {0}")]
    Config(String),

    /// Referenced parent or resource vanished
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The parent cluster has not opted into connector management
    #[error("Connector resources not enabled: {0}")]
    NotEnabled(String),

    /// Mutual exclusion not obtained in time
    #[error("Failed to acquire lock for {key} within {timeout:?}")]
    LockTimeout { key: String, timeout: Duration },

    /// Kafka Connect REST API rejected a request or was unreachable
    #[error("Kafka Connect API error: {0}")]
    ExternalApi(String),

    /// Optimistic-concurrency collision on a status write
    #[error("Conflict: {0}")]
    Conflict(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a not-enabled error
    pub fn not_enabled(msg: impl Into<String>) -> Self {
        Error::NotEnabled(msg.into())
    }

    /// Create an external API error
    pub fn external_api(msg: impl Into<String>) -> Self {
        Error::ExternalApi(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }

    /// Classify a Kubernetes API error by HTTP status code.
    ///
    /// 404 becomes [`Error::NotFound`] and 409 becomes [`Error::Conflict`];
    /// everything else stays a plain Kubernetes error.
    pub fn from_kube(err: kube::Error, what: &str) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => {
                Error::NotFound(format!("{}: {}", what, resp.message))
            }
            kube::Error::Api(resp) if resp.code == 409 => {
                Error::Conflict(format!("{}: {}", what, resp.message))
            }
            other => Error::Kube(other),
        }
    }

    /// Reason code recorded on a status condition for this error
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Config(_) | Error::Serialization(_) => "ConfigurationError",
            Error::NotFound(_) => "NotFoundError",
            Error::NotEnabled(_) => "NotEnabled",
            Error::LockTimeout { .. } => "LockTimeoutError",
            Error::ExternalApi(_) | Error::Http(_) => "ExternalApiError",
            Error::Conflict(_) => "ConflictError",
            Error::Kube(_) => "KubernetesError",
        }
    }

    /// Whether this error is a conflict on an optimistic-concurrency write
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Whether this error reports a missing resource
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Test".to_string(),
            code,
        })
    }

    #[test]
    fn classifies_kube_status_codes() {
        assert!(Error::from_kube(api_error(404), "KafkaConnect ns/a").is_not_found());
        assert!(Error::from_kube(api_error(409), "KafkaConnect ns/a").is_conflict());
        assert!(matches!(
            Error::from_kube(api_error(500), "KafkaConnect ns/a"),
            Error::Kube(_)
        ));
    }

    #[test]
    fn reasons_follow_taxonomy() {
        assert_eq!(Error::config("x").reason(), "ConfigurationError");
        assert_eq!(Error::not_found("x").reason(), "NotFoundError");
        assert_eq!(Error::not_enabled("x").reason(), "NotEnabled");
        assert_eq!(Error::external_api("x").reason(), "ExternalApiError");
        assert_eq!(Error::conflict("x").reason(), "ConflictError");
        let timeout = Error::LockTimeout {
            key: "KafkaConnect(ns/a)".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(timeout.reason(), "LockTimeoutError");
    }
}
