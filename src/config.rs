//! Operator configuration loaded from environment variables

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use crate::error::{Error, Result};

pub const STRIMZI_NAMESPACE: &str = "STRIMZI_NAMESPACE";
pub const STRIMZI_FULL_RECONCILIATION_INTERVAL_MS: &str = "STRIMZI_FULL_RECONCILIATION_INTERVAL_MS";
pub const STRIMZI_OPERATION_TIMEOUT_MS: &str = "STRIMZI_OPERATION_TIMEOUT_MS";
pub const STRIMZI_LOCK_TIMEOUT_MS: &str = "STRIMZI_LOCK_TIMEOUT_MS";
pub const STRIMZI_SUPPORTS_S2I: &str = "STRIMZI_SUPPORTS_S2I";
pub const STRIMZI_METRICS_PORT: &str = "STRIMZI_METRICS_PORT";

const ANY_NAMESPACE: &str = "*";
const DEFAULT_FULL_RECONCILIATION_INTERVAL_MS: u64 = 120_000;
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 300_000;
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_METRICS_PORT: u16 = 8080;

/// Namespaces the operator watches
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchNamespaces {
    /// Every namespace in the cluster
    All,
    /// An explicit set of namespaces
    Only(BTreeSet<String>),
}

impl WatchNamespaces {
    /// One entry per API scope to list or watch; `None` is cluster-wide
    pub fn scopes(&self) -> Vec<Option<String>> {
        match self {
            WatchNamespaces::All => vec![None],
            WatchNamespaces::Only(namespaces) => namespaces.iter().cloned().map(Some).collect(),
        }
    }
}

/// Operator configuration
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Namespaces to watch
    pub namespaces: WatchNamespaces,
    /// Interval between periodic full reconciliations
    pub full_reconciliation_interval: Duration,
    /// Timeout applied to every Kafka Connect REST call
    pub operation_timeout: Duration,
    /// How long a pass waits for the per-resource lock
    pub lock_timeout: Duration,
    /// Whether the platform serves KafkaConnectS2I
    pub supports_s2i: bool,
    /// Port for the metrics and health server
    pub metrics_port: u16,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespaces: WatchNamespaces::All,
            full_reconciliation_interval: Duration::from_millis(
                DEFAULT_FULL_RECONCILIATION_INTERVAL_MS,
            ),
            operation_timeout: Duration::from_millis(DEFAULT_OPERATION_TIMEOUT_MS),
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            supports_s2i: false,
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

impl OperatorConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_map(&vars)
    }

    /// Load configuration from a map of variables
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            namespaces: parse_namespaces(map.get(STRIMZI_NAMESPACE).map(String::as_str))?,
            full_reconciliation_interval: parse_millis(
                map,
                STRIMZI_FULL_RECONCILIATION_INTERVAL_MS,
                defaults.full_reconciliation_interval,
            )?,
            operation_timeout: parse_millis(
                map,
                STRIMZI_OPERATION_TIMEOUT_MS,
                defaults.operation_timeout,
            )?,
            lock_timeout: parse_millis(map, STRIMZI_LOCK_TIMEOUT_MS, defaults.lock_timeout)?,
            supports_s2i: parse_bool(map, STRIMZI_SUPPORTS_S2I, defaults.supports_s2i)?,
            metrics_port: match map.get(STRIMZI_METRICS_PORT) {
                Some(raw) => raw.trim().parse().map_err(|e| {
                    Error::config(format!("{} '{}' is not a valid port: {}", STRIMZI_METRICS_PORT, raw, e))
                })?,
                None => defaults.metrics_port,
            },
        })
    }
}

fn parse_namespaces(raw: Option<&str>) -> Result<WatchNamespaces> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(WatchNamespaces::All);
    };
    if raw == ANY_NAMESPACE {
        return Ok(WatchNamespaces::All);
    }

    let mut namespaces = BTreeSet::new();
    for ns in raw.split(',').map(str::trim) {
        let valid = !ns.is_empty()
            && ns
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-');
        if !valid {
            return Err(Error::config(format!(
                "{} '{}' is not a valid list of namespaces nor the 'any namespace' wildcard {}",
                STRIMZI_NAMESPACE, raw, ANY_NAMESPACE
            )));
        }
        namespaces.insert(ns.to_string());
    }
    Ok(WatchNamespaces::Only(namespaces))
}

fn parse_millis(map: &HashMap<String, String>, key: &str, default: Duration) -> Result<Duration> {
    let Some(raw) = map.get(key) else {
        return Ok(default);
    };
    let millis = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| Error::config(format!("{} '{}' is not a number: {}", key, raw, e)))?;
    if millis == 0 {
        return Err(Error::config(format!("{} must be greater than zero", key)));
    }
    Ok(Duration::from_millis(millis))
}

fn parse_bool(map: &HashMap<String, String>, key: &str, default: bool) -> Result<bool> {
    match map.get(key).map(|s| s.trim().to_ascii_lowercase()) {
        Some(v) if v == "true" => Ok(true),
        Some(v) if v == "false" => Ok(false),
        Some(v) => Err(Error::config(format!("{} '{}' is not a boolean", key, v))),
        None => Ok(default),
    }
}
