//! Conditional status writes
//!
//! A status is only written when it differs structurally from what is
//! stored. Transition timestamps of otherwise unchanged conditions do not
//! count as a difference.

use std::sync::Arc;

use kube::Resource;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::reconciliation::Reconciliation;
use crate::adapters::ResourceStore;
use crate::crd::{carry_transition_times, ManagedResource, ResourceStatus, WithStatus};
use crate::error::Result;
use crate::metrics;

/// Status paths whose changes alone never justify a write
pub const DEFAULT_IGNORED_PATHS: &[&str] = &["/conditions/*/lastTransitionTime"];

/// Structural difference between two statuses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusDiff {
    changes: Vec<String>,
}

impl StatusDiff {
    /// Diff ignoring [`DEFAULT_IGNORED_PATHS`]
    pub fn new<S: Serialize>(current: Option<&S>, desired: &S) -> Result<Self> {
        Self::with_ignored(current, desired, DEFAULT_IGNORED_PATHS)
    }

    /// Diff ignoring the given JSON pointer patterns; `*` matches any one segment
    pub fn with_ignored<S: Serialize>(
        current: Option<&S>,
        desired: &S,
        ignored: &[&str],
    ) -> Result<Self> {
        let current = match current {
            Some(status) => serde_json::to_value(status)?,
            None => Value::Null,
        };
        let desired = serde_json::to_value(desired)?;
        let patterns: Vec<Vec<&str>> = ignored.iter().map(|p| split_pointer(p)).collect();

        let mut changes = Vec::new();
        diff_values(&mut Vec::new(), &current, &desired, &patterns, &mut changes);
        Ok(Self { changes })
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// JSON pointers of every changed value
    pub fn changed_paths(&self) -> &[String] {
        &self.changes
    }
}

fn split_pointer(pointer: &str) -> Vec<&str> {
    pointer.split('/').filter(|s| !s.is_empty()).collect()
}

fn is_ignored(path: &[String], patterns: &[Vec<&str>]) -> bool {
    patterns.iter().any(|pattern| {
        pattern.len() == path.len()
            && pattern
                .iter()
                .zip(path)
                .all(|(expected, actual)| *expected == "*" || expected == actual)
    })
}

fn pointer(path: &[String]) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.iter().map(|s| format!("/{}", s)).collect()
    }
}

fn diff_values(
    path: &mut Vec<String>,
    current: &Value,
    desired: &Value,
    patterns: &[Vec<&str>],
    out: &mut Vec<String>,
) {
    if is_ignored(path, patterns) {
        return;
    }
    match (current, desired) {
        (Value::Object(a), Value::Object(b)) => {
            let mut keys: Vec<&String> = a.keys().chain(b.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                path.push(key.clone());
                diff_values(
                    path,
                    a.get(key).unwrap_or(&Value::Null),
                    b.get(key).unwrap_or(&Value::Null),
                    patterns,
                    out,
                );
                path.pop();
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            for i in 0..a.len().max(b.len()) {
                path.push(i.to_string());
                diff_values(
                    path,
                    a.get(i).unwrap_or(&Value::Null),
                    b.get(i).unwrap_or(&Value::Null),
                    patterns,
                    out,
                );
                path.pop();
            }
        }
        (a, b) if a != b => out.push(pointer(path)),
        _ => {}
    }
}

/// Result of a status reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Stored status already matched
    Unchanged,
    /// New status written
    Updated,
    /// Resource was deleted before the write
    ResourceGone,
    /// Resource version has no status subresource
    Unsupported,
}

impl StatusUpdate {
    fn as_str(&self) -> &'static str {
        match self {
            StatusUpdate::Unchanged => "unchanged",
            StatusUpdate::Updated => "updated",
            StatusUpdate::ResourceGone => "gone",
            StatusUpdate::Unsupported => "unsupported",
        }
    }
}

/// Writes a desired status when, and only when, it differs from the stored one
pub struct StatusReconciler<K> {
    store: Arc<dyn ResourceStore<K>>,
}

impl<K> Clone for StatusReconciler<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<K: ManagedResource> StatusReconciler<K> {
    pub fn new(store: Arc<dyn ResourceStore<K>>) -> Self {
        Self { store }
    }

    /// Persist `desired` as the status of `namespace/name` if it changed
    ///
    /// The resource is re-read first so the diff is against the stored
    /// status. A conflicting write is retried once against a fresh copy.
    pub async fn reconcile(
        &self,
        reconciliation: &Reconciliation,
        namespace: &str,
        name: &str,
        desired: K::Status,
    ) -> Result<StatusUpdate> {
        let kind = K::kind(&());
        let result = match self.attempt(reconciliation, namespace, name, &desired).await {
            Err(e) if e.is_conflict() => {
                debug!(%reconciliation, "{} {} changed concurrently, retrying status update", kind, name);
                self.attempt(reconciliation, namespace, name, &desired).await
            }
            other => other,
        };

        match &result {
            Ok(update) => {
                metrics::STATUS_UPDATES
                    .with_label_values(&[kind.as_ref(), update.as_str()])
                    .inc();
            }
            Err(e) => {
                warn!(%reconciliation, error = %e, "Failed to update status of {} {}", kind, name);
                metrics::STATUS_UPDATES
                    .with_label_values(&[kind.as_ref(), "failed"])
                    .inc();
            }
        }
        result
    }

    async fn attempt(
        &self,
        reconciliation: &Reconciliation,
        namespace: &str,
        name: &str,
        desired: &K::Status,
    ) -> Result<StatusUpdate> {
        let kind = K::kind(&());
        let Some(current) = self.store.get(namespace, name).await? else {
            debug!(%reconciliation, "{} {} no longer exists, skipping status update", kind, name);
            return Ok(StatusUpdate::ResourceGone);
        };

        if !self.store.supports_status(&current) {
            warn!(
                %reconciliation,
                "{} {} needs to be upgraded to a version with a status subresource to use the status field",
                kind, name
            );
            return Ok(StatusUpdate::Unsupported);
        }

        let diff = StatusDiff::new(current.status(), desired)?;
        if diff.is_empty() {
            debug!(%reconciliation, "Status of {} {} did not change", kind, name);
            return Ok(StatusUpdate::Unchanged);
        }
        debug!(%reconciliation, changed = ?diff.changed_paths(), "Updating status of {} {}", kind, name);

        let mut next = desired.clone();
        if let Some(previous) = current.status() {
            carry_transition_times(previous.conditions(), next.conditions_mut());
        }
        let mut updated = current;
        updated.set_status(next);

        match self.store.update_status(&updated).await {
            Ok(()) => Ok(StatusUpdate::Updated),
            Err(e) if e.is_not_found() => Ok(StatusUpdate::ResourceGone),
            Err(e) => Err(e),
        }
    }
}
