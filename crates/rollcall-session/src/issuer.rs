//! The session issuer: mints the one live attendance session.
//!
//! Issuance is strictly invalidate-then-create:
//!
//! ```text
//! issue()
//!   1. GET    qr:current           ── is anything live?
//!   2. DEL    qr:session:<old>     ── kill it explicitly,
//!      DEL    qr:current              don't wait for its TTL
//!   3. SET    qr:session:<new> EX  ── write the new record
//!   4. SET    qr:current       EX  ── and point at it
//! ```
//!
//! If any step fails the error propagates and the caller decides whether
//! to retry. A failure after step 2 leaves no live session, never a
//! stale one.
//!
//! The issuer also serves the presenter's rotating display through
//! [`SessionIssuer::current_code`], a pure read of the same pointer.

use std::sync::Arc;

use rand::Rng;
use rollcall_protocol::{DisplayCode, ScanPayload, SessionId, render_qr_data_url};

use crate::store::bounded;
use crate::{
    Clock, CurrentPointer, ExpiringStore, IssuedSession, SessionConfig,
    SessionError, SessionRecord, StoreError, SystemClock,
};

/// Issues sessions into a shared [`ExpiringStore`].
///
/// Holds no session state of its own: two issuers on two machines
/// pointed at the same store behave as one, with the last write to the
/// pointer winning.
pub struct SessionIssuer<S, C = SystemClock> {
    store: Arc<S>,
    clock: C,
    config: SessionConfig,
}

impl<S: ExpiringStore> SessionIssuer<S, SystemClock> {
    /// Creates an issuer on the system clock.
    pub fn new(store: Arc<S>, config: SessionConfig) -> Self {
        Self::with_clock(store, SystemClock, config)
    }
}

impl<S: ExpiringStore, C: Clock> SessionIssuer<S, C> {
    /// Creates an issuer on a specific clock.
    pub fn with_clock(store: Arc<S>, clock: C, config: SessionConfig) -> Self {
        Self {
            store,
            clock,
            config: config.validated(),
        }
    }

    /// The validated configuration in use.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Mints a new session and makes it the only live one.
    ///
    /// # Errors
    /// [`SessionError::StoreUnavailable`] if any store call fails or
    /// times out, and [`SessionError::Payload`] if the scan payload can't
    /// be encoded or drawn (checked before anything is written).
    pub async fn issue(&self) -> Result<IssuedSession, SessionError> {
        let session_id = generate_session_id();
        let event_id = self.config.event_id.clone();
        let payload = ScanPayload::for_session(&session_id, &event_id).encode()?;
        let qr_image = render_qr_data_url(&payload)?;

        if let Some(old) = self.invalidate_current().await? {
            tracing::debug!(%old, "previous session invalidated");
        }

        let created_at = self.clock.now_secs();
        let ttl = self.config.store_ttl_secs();
        let limit = self.config.store_timeout;

        let record = SessionRecord {
            session_id: session_id.clone(),
            event_id: event_id.clone(),
            created_at,
            ttl_secs: self.config.ttl_secs,
        };
        let record_key = self.config.session_key(&session_id);
        let record_json = to_json(&record_key, &record)?;
        bounded(limit, self.store.set(&record_key, record_json, ttl)).await?;

        let pointer = CurrentPointer {
            session_id: session_id.clone(),
            event_id: event_id.clone(),
            created_at,
        };
        let current_key = self.config.current_key();
        let pointer_json = to_json(&current_key, &pointer)?;
        bounded(limit, self.store.set(&current_key, pointer_json, ttl)).await?;

        tracing::info!(%session_id, %event_id, created_at, "session issued");

        Ok(IssuedSession {
            session_id,
            event_id,
            created_at,
            expires_at: created_at.saturating_add(self.config.ttl_secs),
            payload,
            qr_image,
        })
    }

    /// Deletes the current pointer and the record it names.
    ///
    /// Returns the id that was live, if any. A pointer that doesn't parse
    /// is still deleted; its record is left to expire on its own.
    async fn invalidate_current(&self) -> Result<Option<SessionId>, StoreError> {
        let limit = self.config.store_timeout;
        let current_key = self.config.current_key();

        let Some(raw) = bounded(limit, self.store.get(&current_key)).await? else {
            return Ok(None);
        };

        let old = match serde_json::from_str::<CurrentPointer>(&raw) {
            Ok(pointer) => {
                let record_key = self.config.session_key(&pointer.session_id);
                bounded(limit, self.store.delete(&record_key)).await?;
                Some(pointer.session_id)
            }
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable session pointer");
                None
            }
        };

        bounded(limit, self.store.delete(&current_key)).await?;
        Ok(old)
    }

    /// The code the presenter should be showing right now.
    ///
    /// The shuffle index is derived from the pointer's `created_at`, not
    /// from any local counter, so every instance sharing the store shows
    /// the same frame. Returns `None` when nothing is live or the live
    /// session is past its window.
    ///
    /// # Errors
    /// [`SessionError::StoreUnavailable`] if the pointer can't be read.
    pub async fn current_code(&self) -> Result<Option<DisplayCode>, SessionError> {
        let Some(pointer) = CurrentPointer::load(&*self.store, &self.config).await?
        else {
            return Ok(None);
        };

        let elapsed = self.clock.now_secs().saturating_sub(pointer.created_at);
        if elapsed >= self.config.ttl_secs {
            return Ok(None);
        }

        let index = u32::try_from(elapsed / self.config.rotation_interval_secs)
            .unwrap_or(u32::MAX);
        let payload =
            ScanPayload::for_rotation(&pointer.session_id, &pointer.event_id, index)
                .encode()?;
        let qr_image = render_qr_data_url(&payload)?;

        tracing::trace!(session_id = %pointer.session_id, index, "display code computed");

        Ok(Some(DisplayCode {
            session_id: pointer.session_id.rotated(index),
            base_session_id: pointer.session_id,
            shuffle_index: index,
            created_at: pointer.created_at,
            expires_in: self.config.ttl_secs - elapsed,
            payload,
            qr_image,
        }))
    }
}

fn to_json<T: serde::Serialize>(key: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Corrupt {
        key: key.to_owned(),
        reason: e.to_string(),
    })
}

/// Generates a 32-character lowercase hex id (128 random bits).
///
/// `rand::rng()` is a CSPRNG seeded from the OS, so ids are both
/// unguessable and, at 2^128 possibilities, never repeated in practice.
fn generate_session_id() -> SessionId {
    let bytes: [u8; 16] = rand::rng().random();
    SessionId::new(bytes.iter().map(|b| format!("{b:02x}")).collect::<String>())
}

// =========================================================================
// Tests
// =========================================================================
