//! Error types for the session layer.

use std::time::Duration;

use rollcall_protocol::{
    CourseId, ProtocolError, RejectReason, SessionId, StudentId,
};

/// Failures talking to the expiring store.
///
/// All of these are infrastructure problems. None of them says anything
/// about whether a presented code is valid.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend refused or dropped the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend didn't answer within the configured bound.
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// A stored value couldn't be read or written as JSON.
    #[error("corrupt value at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Errors from issuing or verifying a session.
///
/// The three rejection variants are terminal for one attempt and map
/// one-to-one onto [`RejectReason`]. `StoreUnavailable` is transient and
/// must never be shown to the user as "invalid code".
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The store failed, timed out, or returned unreadable data.
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),

    /// Nothing is current: never issued, or evicted after its window.
    #[error("no active session")]
    NoActiveSession,

    /// The presented id is not the current session.
    #[error("session {presented} is not the active session")]
    SessionMismatch { presented: SessionId },

    /// The presented id is current but its window has closed.
    #[error("session {session_id} expired {elapsed_secs}s after creation")]
    SessionExpired {
        session_id: SessionId,
        elapsed_secs: u64,
    },

    /// The scanned text didn't contain a usable id, or an issued
    /// payload couldn't be drawn as a QR image.
    #[error(transparent)]
    Payload(#[from] ProtocolError),
}

impl SessionError {
    /// The user-facing rejection this error corresponds to, if any.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::NoActiveSession => Some(RejectReason::NoActiveSession),
            Self::SessionMismatch { .. } => Some(RejectReason::SessionMismatch),
            Self::SessionExpired { .. } => Some(RejectReason::SessionExpired),
            Self::StoreUnavailable(_) | Self::Payload(_) => None,
        }
    }

    /// Whether the same request may succeed if sent again unchanged.
    ///
    /// A corrupt stored value stays corrupt until the next issuance or
    /// its TTL, so retrying right away can't help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(StoreError::Unavailable(_) | StoreError::Timeout(_))
        )
    }
}

/// Errors reported by an [`AttendanceRecorder`](crate::AttendanceRecorder).
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("unknown student {0}")]
    UnknownStudent(StudentId),

    #[error("unknown course {0}")]
    UnknownCourse(CourseId),

    /// The attendance backend is down. Safe to retry.
    #[error("attendance backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the full scan-to-mark flow.
#[derive(Debug, thiserror::Error)]
pub enum CheckInError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Record(#[from] RecordError),
}
