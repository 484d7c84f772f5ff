//! The session verifier: is this scanned code the live one?
//!
//! Verification is a single read of the current pointer followed by
//! three checks, in this order:
//!
//! 1. Is anything current?            → otherwise `NoActiveSession`
//! 2. Is the presented id that one?   → otherwise `SessionMismatch`
//! 3. Is it still inside its window?  → otherwise `SessionExpired`
//!
//! The verifier never writes. Any number of scanners can verify the same
//! session concurrently, and a store failure is reported as
//! `StoreUnavailable` rather than as a rejection.

use std::sync::Arc;

use rollcall_protocol::{EventId, ScanPayload, SessionId};

use crate::{
    Clock, CurrentPointer, ExpiringStore, SessionConfig, SessionError,
    SystemClock, VerifiedSession,
};

/// Checks presented session ids against the shared store.
pub struct SessionVerifier<S, C = SystemClock> {
    store: Arc<S>,
    clock: C,
    config: SessionConfig,
}

impl<S: ExpiringStore> SessionVerifier<S, SystemClock> {
    /// Creates a verifier on the system clock.
    pub fn new(store: Arc<S>, config: SessionConfig) -> Self {
        Self::with_clock(store, SystemClock, config)
    }
}

impl<S: ExpiringStore, C: Clock> SessionVerifier<S, C> {
    /// Creates a verifier on a specific clock.
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

    /// Verifies a presented session id.
    ///
    /// `presented` may be the base id or any rotated variant
    /// (`<id>_shuffle_<n>`); the suffix is stripped before comparing.
    ///
    /// # Errors
    /// One of the three rejections, or [`SessionError::StoreUnavailable`]
    /// if the pointer can't be read or doesn't parse.
    pub async fn verify(&self, presented: &str) -> Result<VerifiedSession, SessionError> {
        let presented = SessionId::normalize(presented);
        self.check(presented, None).await
    }

    /// Verifies whatever a scanner read off the code.
    ///
    /// Accepts everything [`ScanPayload::decode`] accepts. A payload that
    /// names a different event than the live session is a mismatch even
    /// if the ids agree.
    ///
    /// # Errors
    /// As [`verify`](Self::verify), plus [`SessionError::Payload`] if the
    /// text holds no usable id.
    pub async fn verify_scan(&self, scanned: &str) -> Result<VerifiedSession, SessionError> {
        let payload = ScanPayload::decode(scanned)?;
        let presented = payload.base_session_id();
        self.check(presented, payload.event_id.as_ref()).await
    }

    async fn check(
        &self,
        presented: SessionId,
        presented_event: Option<&EventId>,
    ) -> Result<VerifiedSession, SessionError> {
        let result = self.decide(presented, presented_event).await;
        match &result {
            Ok(verified) => tracing::debug!(
                session_id = %verified.session_id,
                "session verified"
            ),
            Err(e) if e.reject_reason().is_some() => {
                tracing::info!(reason = %e, "verification rejected");
            }
            Err(e) => tracing::warn!(error = %e, "verification failed"),
        }
        result
    }

    async fn decide(
        &self,
        presented: SessionId,
        presented_event: Option<&EventId>,
    ) -> Result<VerifiedSession, SessionError> {
        let Some(current) = CurrentPointer::load(&*self.store, &self.config).await?
        else {
            return Err(SessionError::NoActiveSession);
        };

        let event_differs =
            presented_event.is_some_and(|event| *event != current.event_id);
        if presented != current.session_id || event_differs {
            return Err(SessionError::SessionMismatch { presented });
        }

        let now = self.clock.now_secs();
        let elapsed = now.saturating_sub(current.created_at);
        if elapsed >= self.config.ttl_secs {
            return Err(SessionError::SessionExpired {
                session_id: current.session_id,
                elapsed_secs: elapsed,
            });
        }

        Ok(VerifiedSession {
            session_id: current.session_id,
            event_id: current.event_id,
            created_at: current.created_at,
            verified_at: now,
        })
    }
}
