//! Redis-backed [`ExpiringStore`] (feature `redis`).
//!
//! Redis executes commands one at a time, so `SET ... EX`, `GET` and
//! `DEL` are each atomic without any locking on our side, and the TTL is
//! enforced by the server itself.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::{ExpiringStore, StoreError};

/// A store on a shared Redis instance.
///
/// Cloning is cheap: every clone multiplexes over the same managed
/// connection, which reconnects on its own after a drop.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connects to `url` (e.g. `redis://127.0.0.1:6379`).
    ///
    /// # Errors
    /// [`StoreError::Unavailable`] if the URL is invalid or the first
    /// connection attempt fails.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let conn = ConnectionManager::new(client).await.map_err(unavailable)?;
        tracing::info!("connected to redis session store");
        Ok(Self { conn })
    }
}

impl ExpiringStore for RedisStore {
    async fn set(
        &self,
        key: &str,
        value: String,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        // Redis rejects `EX 0`.
        conn.set_ex::<_, _, ()>(key, value, ttl_secs.max(1))
            .await
            .map_err(unavailable)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key).await.map_err(unavailable)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(unavailable)
    }
}

fn unavailable(e: redis::RedisError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Connects to the server named by `ROLLCALL_REDIS_URL`.
    ///
    /// Run with `ROLLCALL_REDIS_URL=redis://127.0.0.1:6379 cargo test
    /// --features redis -- --ignored`.
    async fn store_from_env() -> Option<RedisStore> {
        let url = std::env::var("ROLLCALL_REDIS_URL").ok()?;
        Some(RedisStore::connect(&url).await.expect("redis should accept connections"))
    }

    fn key(name: &str) -> String {
        format!("rollcall-test:{}:{name}", std::process::id())
    }

    #[tokio::test]
    #[ignore = "needs a Redis server at ROLLCALL_REDIS_URL"]
    async fn test_set_get_overwrite_delete() {
        let Some(store) = store_from_env().await else {
            return;
        };
        let k = key("crud");

        assert_eq!(store.get(&k).await.unwrap(), None);

        store.set(&k, "first".into(), 30).await.unwrap();
        assert_eq!(store.get(&k).await.unwrap().as_deref(), Some("first"));

        store.set(&k, "second".into(), 30).await.unwrap();
        assert_eq!(store.get(&k).await.unwrap().as_deref(), Some("second"));

        store.delete(&k).await.unwrap();
        assert_eq!(store.get(&k).await.unwrap(), None);

        store.delete(&k).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "needs a Redis server at ROLLCALL_REDIS_URL"]
    async fn test_zero_ttl_is_clamped_to_one_second() {
        let Some(store) = store_from_env().await else {
            return;
        };
        let k = key("zero-ttl");

        store.set(&k, "v".into(), 0).await.unwrap();

        assert_eq!(store.get(&k).await.unwrap().as_deref(), Some("v"));
        let mut conn = store.conn.clone();
        let ttl = conn.ttl::<_, i64>(&k).await.unwrap();
        assert!((0..=1).contains(&ttl), "ttl was {ttl}");
    }

    #[tokio::test]
    #[ignore = "needs a Redis server at ROLLCALL_REDIS_URL"]
    async fn test_entry_expires_after_ttl() {
        let Some(store) = store_from_env().await else {
            return;
        };
        let k = key("expiry");

        store.set(&k, "v".into(), 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(store.get(&k).await.unwrap(), None);
    }
}
