//! The expiring key-value store adapter.
//!
//! This is the seam between the session state machine and whatever
//! actually holds the records: an in-process map for tests and single
//! nodes, Redis for shared deployments.

use std::future::Future;
use std::time::Duration;

use crate::StoreError;

/// A key-value store whose entries disappear after a TTL.
///
/// Each method must be atomic on its own. The issuer and verifier never
/// read-modify-write a single key, so per-operation atomicity (which any
/// single-threaded command store gives you) is all they need.
///
/// # Example
///
/// ```rust
/// use rollcall_session::{ExpiringStore, StoreError};
///
/// /// A store that is always down. Handy for testing retry paths.
/// struct Offline;
///
/// impl ExpiringStore for Offline {
///     async fn set(&self, _: &str, _: String, _: u64) -> Result<(), StoreError> {
///         Err(StoreError::Unavailable("offline".into()))
///     }
///     async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
///         Err(StoreError::Unavailable("offline".into()))
///     }
///     async fn delete(&self, _: &str) -> Result<(), StoreError> {
///         Err(StoreError::Unavailable("offline".into()))
///     }
/// }
/// ```
pub trait ExpiringStore: Send + Sync + 'static {
    /// Creates or overwrites `key`. The entry is gone `ttl_secs` seconds
    /// later unless overwritten first.
    fn set(
        &self,
        key: &str,
        value: String,
        ttl_secs: u64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Reads `key`, or `None` if it is absent or expired.
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Removes `key`. Removing an absent key is not an error.
    fn delete(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Runs a store call with an upper time bound.
///
/// A call still pending at `limit` is abandoned and reported as
/// [`StoreError::Timeout`].
pub(crate) async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(?limit, "store call timed out");
            Err(StoreError::Timeout(limit))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_passes_through_fast_result() {
        let result =
            bounded(Duration::from_secs(1), async { Ok::<_, StoreError>(7) })
                .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out_stalled_call() {
        let stalled = async {
            std::future::pending::<()>().await;
            Ok::<u8, StoreError>(0)
        };
        let result = bounded(Duration::from_secs(2), stalled).await;
        assert!(matches!(result, Err(StoreError::Timeout(d)) if d == Duration::from_secs(2)));
    }
}
