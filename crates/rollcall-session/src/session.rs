//! Session types: configuration, the records kept in the store, and the
//! values handed back to callers.

use std::time::Duration;

use rollcall_protocol::{EventId, SessionId};
use serde::{Deserialize, Serialize};

use crate::{ExpiringStore, StoreError};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Tunables for issuance and verification.
///
/// Build one with struct-update syntax over [`Default`] and let the
/// issuer or verifier call [`validated`](Self::validated) on it.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a session is valid, measured from `created_at`.
    ///
    /// Default: 30 seconds.
    pub ttl_secs: u64,

    /// Extra seconds the store keeps records after the window closes.
    ///
    /// While a record is still stored but outside its window, scans
    /// report `SessionExpired`; once the store has dropped it they
    /// report `NoActiveSession`. Default: 5 seconds.
    pub retention_grace_secs: u64,

    /// How often the display code rotates to a new shuffle index.
    ///
    /// Default: 5 seconds, which gives six codes per 30-second window.
    pub rotation_interval_secs: u64,

    /// Event every issued session belongs to.
    pub event_id: EventId,

    /// Namespace for store keys, so several deployments can share one
    /// store.
    pub key_prefix: String,

    /// Upper bound on any single store call. A call that takes longer
    /// fails as [`StoreError::Timeout`].
    pub store_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30,
            retention_grace_secs: 5,
            rotation_interval_secs: 5,
            event_id: EventId::new("attend2025"),
            key_prefix: "qr".to_owned(),
            store_timeout: Duration::from_secs(2),
        }
    }
}

impl SessionConfig {
    /// Fixes out-of-range values so the config is safe to use.
    ///
    /// - `ttl_secs` is at least 1.
    /// - `rotation_interval_secs` is clamped to `1..=ttl_secs`.
    /// - A zero `store_timeout` becomes 1 second.
    pub fn validated(mut self) -> Self {
        if self.ttl_secs == 0 {
            tracing::warn!("ttl_secs of 0 would never verify, using 1");
            self.ttl_secs = 1;
        }
        self.rotation_interval_secs =
            self.rotation_interval_secs.clamp(1, self.ttl_secs);
        if self.store_timeout.is_zero() {
            self.store_timeout = Duration::from_secs(1);
        }
        self
    }

    /// TTL handed to the store for both keys of a session.
    pub fn store_ttl_secs(&self) -> u64 {
        self.ttl_secs.saturating_add(self.retention_grace_secs)
    }

    /// Number of distinct rotation slots in one window.
    pub fn rotation_slots(&self) -> u32 {
        let interval = self.rotation_interval_secs.max(1);
        let slots = self.ttl_secs.div_ceil(interval);
        u32::try_from(slots).unwrap_or(u32::MAX)
    }

    /// The well-known key holding the current pointer.
    pub fn current_key(&self) -> String {
        format!("{}:current", self.key_prefix)
    }

    /// The key holding one session's record.
    pub fn session_key(&self, session_id: &SessionId) -> String {
        format!("{}:session:{session_id}", self.key_prefix)
    }
}

// ---------------------------------------------------------------------------
// Stored records
// ---------------------------------------------------------------------------

/// The record written under `<prefix>:session:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub event_id: EventId,
    pub created_at: u64,
    pub ttl_secs: u64,
}

/// The record written under `<prefix>:current`.
///
/// Verification reads only this key, so it carries everything the
/// verifier needs: which session is live and when it started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPointer {
    pub session_id: SessionId,
    pub event_id: EventId,
    pub created_at: u64,
}

impl CurrentPointer {
    /// Reads and parses the pointer.
    ///
    /// Returns `Ok(None)` when no session is current. A pointer that
    /// doesn't parse is reported as [`StoreError::Corrupt`] so that
    /// callers fail closed instead of guessing.
    pub(crate) async fn load<S: ExpiringStore>(
        store: &S,
        config: &SessionConfig,
    ) -> Result<Option<Self>, StoreError> {
        let key = config.current_key();
        let raw = crate::store::bounded(config.store_timeout, store.get(&key))
            .await?;
        match raw {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
                StoreError::Corrupt {
                    key,
                    reason: e.to_string(),
                }
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// What the issuer hands back to the presentation surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedSession {
    pub session_id: SessionId,
    pub event_id: EventId,
    /// Unix seconds when the session was minted.
    pub created_at: u64,
    /// Unix seconds when verification starts failing.
    pub expires_at: u64,
    /// Encoded scan payload, the text inside the QR image.
    pub payload: String,
    /// The payload rendered as an SVG `data:` URL.
    pub qr_image: String,
}

/// A successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSession {
    pub session_id: SessionId,
    pub event_id: EventId,
    pub created_at: u64,
    /// The clock reading the decision was made at.
    pub verified_at: u64,
}
