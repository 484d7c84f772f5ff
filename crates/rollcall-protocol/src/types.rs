//! Core protocol types for Rollcall's wire format.
//!
//! Every type here is serialized to JSON and sent as a WebSocket text
//! frame, so the serde attributes are part of the contract with the
//! presenter page and the scanner app.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Declares a string newtype that serializes as a plain JSON string.
///
/// All four identifiers share the same shape; only the name differs.
/// `#[serde(transparent)]` makes `SessionId("ab12".into())` appear on
/// the wire as `"ab12"` instead of `{"0":"ab12"}`.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw string.
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Borrows the raw string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns `true` if the identifier is the empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }
    };
}

string_id! {
    /// The opaque identifier of one attendance session.
    ///
    /// Minted fresh on every issuance and never reused. Rotated display
    /// variants (`<id>_shuffle_<n>`) are plain strings; only the base id
    /// is ever a `SessionId`.
    SessionId
}

string_id! {
    /// The lecture or event a session belongs to.
    EventId
}

string_id! {
    /// A student, as resolved by the caller before a scan is submitted.
    StudentId
}

string_id! {
    /// A course the attendance mark is recorded against.
    CourseId
}

// ---------------------------------------------------------------------------
// Verification and recording outcomes
// ---------------------------------------------------------------------------

/// Why a presented code was refused.
///
/// These are the three terminal verification failures. They are kept
/// distinct all the way to the client so the user sees an actionable
/// message: a stale code needs a rescan, a missing session needs the
/// presenter to generate one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    /// Nothing has been issued, or the last session was evicted.
    NoActiveSession,
    /// The code belongs to an older session (or was never issued).
    SessionMismatch,
    /// The code is the current one but its window has closed.
    SessionExpired,
}

impl RejectReason {
    /// The message shown to the student who scanned.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::NoActiveSession => {
                "no active code; ask the presenter to generate one"
            }
            Self::SessionMismatch => "this code is stale or wrong; scan the code on screen",
            Self::SessionExpired => "this code has expired; scan the fresh code",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoActiveSession => "NoActiveSession",
            Self::SessionMismatch => "SessionMismatch",
            Self::SessionExpired => "SessionExpired",
        };
        f.write_str(name)
    }
}

/// What the attendance recorder did with a mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordOutcome {
    /// First mark for this (student, course, date).
    Created,
    /// The student was already marked present; nothing changed.
    AlreadyRecorded,
}

// ---------------------------------------------------------------------------
// Display codes
// ---------------------------------------------------------------------------

/// One frame of the presenter's rotating QR display.
///
/// `session_id` is the rotated form that the QR encodes; `base_session_id`
/// is what verification normalizes it back to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayCode {
    /// Rotated identifier, e.g. `9f2c..._shuffle_2`.
    pub session_id: String,
    /// The session this frame belongs to.
    pub base_session_id: SessionId,
    /// Rotation slot within the session window (0-based).
    pub shuffle_index: u32,
    /// When the session was minted (Unix seconds).
    pub created_at: u64,
    /// Seconds until the session window closes.
    pub expires_in: u64,
    /// Encoded scan payload, the text inside the QR image.
    pub payload: String,
    /// The QR image as an SVG `data:` URL.
    pub qr_image: String,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Messages sent by presenter pages and scanner apps.
///
/// `#[serde(tag = "type")]` produces internally tagged JSON:
/// `{"type":"Verify","session_id":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Presenter → Server: mint a new session, killing the current one.
    IssueSession,

    /// Presenter → Server: give me the current rotated code, if any.
    CurrentCode,

    /// Presenter → Server: push every code the presenter loop produces.
    WatchCodes,

    /// Scanner → Server: is this id the live session? No side effects.
    Verify { session_id: String },

    /// Scanner → Server: verify the scanned payload and, on success,
    /// mark `student_id` present in `course_id`.
    Scan {
        payload: String,
        student_id: StudentId,
        course_id: CourseId,
    },

    /// Keep-alive.
    Ping { client_time: u64 },
}

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// A new session is live.
    SessionIssued {
        session_id: SessionId,
        event_id: EventId,
        created_at: u64,
        expires_at: u64,
        payload: String,
        qr_image: String,
    },

    /// The current display frame.
    Code(DisplayCode),

    /// There is no live session to display.
    NoCode,

    /// The presented id matches the live session.
    Verified {
        session_id: SessionId,
        event_id: EventId,
    },

    /// Verification succeeded and the recorder accepted the mark.
    AttendanceMarked {
        session_id: SessionId,
        event_id: EventId,
        student_id: StudentId,
        course_id: CourseId,
        date: NaiveDate,
        outcome: RecordOutcome,
    },

    /// Verification failed for a user-facing reason.
    Rejected {
        reason: RejectReason,
        message: String,
    },

    /// Reply to [`ClientMessage::Ping`].
    Pong { client_time: u64, server_time: u64 },

    /// Something outside the user's control went wrong.
    ///
    /// `code` follows HTTP conventions: 400 malformed request,
    /// 502 recorder failure, 503 store unavailable. `retryable` tells
    /// the client whether sending the same request again may succeed.
    Error {
        code: u16,
        message: String,
        retryable: bool,
    },
}

impl ServerMessage {
    /// Builds a [`ServerMessage::Rejected`] carrying the reason's
    /// user-facing text.
    pub fn rejected(reason: RejectReason) -> Self {
        Self::Rejected {
            reason,
            message: reason.user_message().to_owned(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&SessionId::new("ab12")).unwrap();
        assert_eq!(json, "\"ab12\"");
    }

    #[test]
    fn test_student_id_display_is_raw_value() {
        assert_eq!(StudentId::from("S-1001").to_string(), "S-1001");
    }

    #[test]
    fn test_client_message_scan_json_shape() {
        let msg = ClientMessage::Scan {
            payload: "tok".into(),
            student_id: "S1".into(),
            course_id: "CS101".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "Scan");
        assert_eq!(value["payload"], "tok");
        assert_eq!(value["student_id"], "S1");
        assert_eq!(value["course_id"], "CS101");
    }

    #[test]
    fn test_client_message_unit_variant_parses_from_type_only() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"IssueSession"}"#).unwrap();
        assert_eq!(msg, ClientMessage::IssueSession);
    }

    #[test]
    fn test_server_message_code_flattens_display_code() {
        let msg = ServerMessage::Code(DisplayCode {
            session_id: "abc_shuffle_1".into(),
            base_session_id: "abc".into(),
            shuffle_index: 1,
            created_at: 1000,
            expires_in: 22,
            payload: "p".into(),
            qr_image: "data:image/svg+xml;base64,AA".into(),
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "Code");
        assert_eq!(value["session_id"], "abc_shuffle_1");
        assert_eq!(value["shuffle_index"], 1);
        assert_eq!(value["qr_image"], "data:image/svg+xml;base64,AA");
    }

    #[test]
    fn test_attendance_marked_date_is_iso_string() {
        let msg = ServerMessage::AttendanceMarked {
            session_id: "abc".into(),
            event_id: "attend2025".into(),
            student_id: "S1".into(),
            course_id: "CS101".into(),
            date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            outcome: RecordOutcome::Created,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["date"], "2025-03-14");
        assert_eq!(value["outcome"], "Created");
    }

    #[test]
    fn test_rejected_carries_user_message() {
        let msg = ServerMessage::rejected(RejectReason::SessionExpired);
        match msg {
            ServerMessage::Rejected { reason, message } => {
                assert_eq!(reason, RejectReason::SessionExpired);
                assert!(message.contains("expired"));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn test_reject_reasons_have_distinct_messages() {
        let a = RejectReason::NoActiveSession.user_message();
        let b = RejectReason::SessionMismatch.user_message();
        let c = RejectReason::SessionExpired.user_message();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }
}
