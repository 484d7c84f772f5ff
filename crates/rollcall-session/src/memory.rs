//! In-process [`ExpiringStore`].
//!
//! Entries carry an absolute expiry in clock seconds. Reads treat an
//! entry at or past its expiry as absent and drop it on the spot, so a
//! reader never observes a record the store should already have evicted.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{Clock, ExpiringStore, StoreError, SystemClock};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: u64,
}

/// A map behind one async mutex, with TTLs measured by a [`Clock`].
///
/// Clones share the same map, so one store can be handed to the issuer,
/// the verifier, and any number of connection tasks.
#[derive(Debug, Clone)]
pub struct MemoryStore<C: Clock = SystemClock> {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    clock: C,
}

impl MemoryStore<SystemClock> {
    /// Creates an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for MemoryStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MemoryStore<C> {
    /// Creates an empty store whose TTLs follow `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Drops every expired entry and returns how many were removed.
    ///
    /// Reads already hide expired entries; call this periodically only
    /// to bound memory when many keys are written and never read again.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now_secs();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, "purged expired store entries");
        }
        removed
    }

    /// Number of entries that haven't expired yet.
    pub async fn live_len(&self) -> usize {
        let now = self.clock.now_secs();
        self.entries
            .lock()
            .await
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }
}

impl<C: Clock> ExpiringStore for MemoryStore<C> {
    async fn set(
        &self,
        key: &str,
        value: String,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let expires_at = self.clock.now_secs().saturating_add(ttl_secs);
        self.entries
            .lock()
            .await
            .insert(key.to_owned(), Entry { value, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now_secs();
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(key) {
            None => return Ok(None),
            Some(entry) => entry.expires_at <= now,
        };
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    fn store_at(secs: u64) -> (MemoryStore<ManualClock>, ManualClock) {
        let clock = ManualClock::at(secs);
        (MemoryStore::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_get_returns_value_before_ttl() {
        let (store, clock) = store_at(1000);
        store.set("k", "v".into(), 30).await.unwrap();

        clock.set(1029);

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_get_returns_none_at_ttl() {
        let (store, clock) = store_at(1000);
        store.set("k", "v".into(), 30).await.unwrap();

        clock.set(1030);

        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.live_len().await, 0);
    }

    #[tokio::test]
    async fn test_set_overwrites_value_and_ttl() {
        let (store, clock) = store_at(1000);
        store.set("k", "old".into(), 5).await.unwrap();
        store.set("k", "new".into(), 60).await.unwrap();

        clock.set(1010);

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_delete_absent_key_is_ok() {
        let (store, _) = store_at(0);
        store.delete("missing").await.unwrap();
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_immediately_absent() {
        let (store, _) = store_at(1000);
        store.set("k", "v".into(), 0).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_purge_expired_removes_only_expired() {
        let (store, clock) = store_at(1000);
        store.set("short", "a".into(), 5).await.unwrap();
        store.set("long", "b".into(), 50).await.unwrap();

        clock.set(1010);

        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.live_len().await, 1);
        assert!(store.get("long").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let (store, _) = store_at(0);
        let other = store.clone();
        store.set("k", "v".into(), 10).await.unwrap();
        assert_eq!(other.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
