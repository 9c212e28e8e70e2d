//! Per-resource mutual exclusion
//!
//! One async mutex per `(kind, namespace, name)`, created on first use and
//! dropped again once nobody holds or waits for it. Waiters on the same key
//! are served in FIFO order by the tokio mutex; different keys never contend.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

use crate::crd::ParentKind;
use crate::error::{Error, Result};

/// Identity of a lockable resource
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub kind: ParentKind,
    pub namespace: String,
    pub name: String,
}

impl LockKey {
    pub fn new(kind: ParentKind, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}/{})", self.kind, self.namespace, self.name)
    }
}

/// Holder token of a lock entry
type Slot = Arc<Mutex<Option<String>>>;

/// Table of per-resource locks, cheap to clone and share
#[derive(Clone, Default)]
pub struct ResourceLock {
    entries: Arc<DashMap<LockKey, Slot>>,
}

impl ResourceLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait up to `timeout` for exclusive access to `key`
    ///
    /// The returned guard releases the lock when dropped.
    pub async fn acquire(
        &self,
        key: LockKey,
        holder: impl Into<String>,
        timeout: Duration,
    ) -> Result<LockGuard> {
        let holder = holder.into();
        // Clone out of the map so no shard lock is held across the await
        let slot = self.entries.entry(key.clone()).or_default().clone();

        let acquired = tokio::time::timeout(timeout, slot.clone().lock_owned()).await;
        // Only the map and live guards or waiters may still reference the slot when pruning
        drop(slot);

        match acquired {
            Ok(mut guard) => {
                trace!(key = %key, holder = %holder, "Lock acquired");
                *guard = Some(holder);
                Ok(LockGuard {
                    key,
                    guard: Some(guard),
                    entries: self.entries.clone(),
                })
            }
            Err(_) => {
                prune(&self.entries, &key);
                Err(Error::LockTimeout {
                    key: key.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Whether `key` is currently held
    pub fn is_locked(&self, key: &LockKey) -> bool {
        self.entries
            .get(key)
            .map(|slot| slot.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Number of keys with a holder or waiters
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Drop the entry for `key` if no guard or waiter references it any more
fn prune(entries: &DashMap<LockKey, Slot>, key: &LockKey) {
    entries.remove_if(key, |_, slot| Arc::strong_count(slot) == 1);
}

/// Exclusive access to one key, released on drop
pub struct LockGuard {
    key: LockKey,
    guard: Option<OwnedMutexGuard<Option<String>>>,
    entries: Arc<DashMap<LockKey, Slot>>,
}

impl LockGuard {
    pub fn key(&self) -> &LockKey {
        &self.key
    }

    /// Token of the pass holding the lock, `None` once released
    pub fn holder(&self) -> Option<&str> {
        self.guard.as_ref().and_then(|g| g.as_deref())
    }

    /// Release the lock; calling this more than once has no effect
    pub fn release(&mut self) {
        if let Some(mut guard) = self.guard.take() {
            trace!(key = %self.key, "Lock released");
            *guard = None;
            drop(guard);
            prune(&self.entries, &self.key);
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(name: &str) -> LockKey {
        LockKey::new(ParentKind::KafkaConnect, "kafka", name)
    }

    #[tokio::test]
    async fn second_acquire_times_out_while_held() {
        let locks = ResourceLock::new();
        let guard = locks
            .acquire(key("a"), "first", Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(guard.holder(), Some("first"));
        assert!(locks.is_locked(&key("a")));

        let err = locks
            .acquire(key("a"), "second", Duration::from_millis(50))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::LockTimeout { .. }));
        assert!(err.to_string().contains("KafkaConnect(kafka/a)"));
    }

    #[tokio::test]
    async fn waiter_proceeds_after_release() {
        let locks = ResourceLock::new();
        let guard = locks
            .acquire(key("a"), "first", Duration::from_millis(50))
            .await
            .unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                locks
                    .acquire(key("a"), "second", Duration::from_secs(5))
                    .await
                    .map(|g| g.holder().map(str::to_string))
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);

        let holder = waiter.await.unwrap().unwrap();
        assert_eq!(holder.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let locks = ResourceLock::new();
        let _a = locks
            .acquire(key("a"), "a", Duration::from_millis(50))
            .await
            .unwrap();
        let b = locks.acquire(key("b"), "b", Duration::from_millis(50)).await;
        assert!(b.is_ok());

        let s2i = LockKey::new(ParentKind::KafkaConnectS2I, "kafka", "a");
        assert!(locks.acquire(s2i, "s2i", Duration::from_millis(50)).await.is_ok());
    }

    #[tokio::test]
    async fn release_is_idempotent_and_prunes_entries() {
        let locks = ResourceLock::new();
        let mut guard = locks
            .acquire(key("a"), "first", Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(locks.len(), 1);

        guard.release();
        guard.release();
        assert!(guard.holder().is_none());
        assert!(locks.is_empty());
        drop(guard);

        assert!(locks
            .acquire(key("a"), "again", Duration::from_millis(50))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn timed_out_waiter_leaves_no_entry_behind() {
        let locks = ResourceLock::new();
        let guard = locks
            .acquire(key("a"), "first", Duration::from_millis(50))
            .await
            .unwrap();

        let err = locks
            .acquire(key("a"), "second", Duration::from_millis(10))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::LockTimeout { .. }));
        assert_eq!(locks.len(), 1);

        drop(guard);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn never_two_holders_at_once() {
        let locks = ResourceLock::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_seen = max_seen.clone();
                tokio::spawn(async move {
                    let _guard = locks
                        .acquire(key("shared"), format!("task-{}", i), Duration::from_secs(10))
                        .await
                        .unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }
}
