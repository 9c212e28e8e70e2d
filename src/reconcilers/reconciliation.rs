//! Identity of a single reconciliation pass

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::lock::LockKey;
use crate::crd::ParentKind;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// What started a pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerSource {
    /// Periodic full reconciliation
    Timer,
    /// Watch event on the cluster resource itself
    Watch,
    /// Watch event on one of its KafkaConnector resources
    ConnectorWatch,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Timer => "timer",
            TriggerSource::Watch => "watch",
            TriggerSource::ConnectorWatch => "connector-watch",
        }
    }
}

/// Correlates one pass across logs, locks and status writes
#[derive(Clone, Debug)]
pub struct Reconciliation {
    id: u64,
    trigger: TriggerSource,
    kind: ParentKind,
    namespace: String,
    name: String,
}

impl Reconciliation {
    pub fn new(
        trigger: TriggerSource,
        kind: ParentKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            trigger,
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn trigger(&self) -> TriggerSource {
        self.trigger
    }

    pub fn kind(&self) -> ParentKind {
        self.kind
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key of the per-resource lock this pass must hold
    pub fn lock_key(&self) -> LockKey {
        LockKey::new(self.kind, &self.namespace, &self.name)
    }
}

impl fmt::Display for Reconciliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Reconciliation #{}({}) {}({}/{})",
            self.id,
            self.trigger.as_str(),
            self.kind,
            self.namespace,
            self.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_rendered() {
        let a = Reconciliation::new(TriggerSource::Timer, ParentKind::KafkaConnect, "kafka", "c1");
        let b = Reconciliation::new(
            TriggerSource::ConnectorWatch,
            ParentKind::KafkaConnect,
            "kafka",
            "c1",
        );
        assert_ne!(a.id(), b.id());
        assert_eq!(a.lock_key(), b.lock_key());
        let rendered = b.to_string();
        assert!(rendered.starts_with(&format!("Reconciliation #{}(connector-watch)", b.id())));
        assert!(rendered.ends_with("KafkaConnect(kafka/c1)"));
    }
}
