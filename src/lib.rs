//! Kafka Connect Kubernetes Operator
//!
//! This operator reconciles KafkaConnect and KafkaConnectS2I clusters and
//! keeps the connectors running in them in line with KafkaConnector
//! custom resources.

pub mod adapters;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod reconcilers;

pub use error::{Error, Result};
