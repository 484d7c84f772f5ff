//! Attendance session management for Rollcall.
//!
//! This crate owns the state machine behind the QR code on the
//! presenter's screen:
//!
//! 1. **Issuance** ([`SessionIssuer`]): mint a session, killing the
//!    previous one first, and hand back a scannable payload.
//! 2. **Verification** ([`SessionVerifier`]): decide whether a presented
//!    id is the live session and still inside its window.
//! 3. **Recording** ([`AttendanceRecorder`], [`AttendanceDesk`]): turn a
//!    successful verification into an idempotent attendance mark.
//!
//! # Where the state lives
//!
//! Neither the issuer nor the verifier keeps the current session in
//! memory. Every call goes to the [`ExpiringStore`], which is the single
//! source of truth for however many server instances share it.
//!
//! ```text
//! Presenter ── issue() ──→ ┌───────────────┐ ←── verify() ── Scanners
//!                          │ ExpiringStore │
//!                          │  qr:current   │
//!                          │  qr:session:* │
//!                          └───────────────┘
//! ```

#![allow(async_fn_in_trait)]

mod clock;
mod desk;
mod error;
mod issuer;
mod memory;
mod recorder;
#[cfg(feature = "redis")]
mod redis_store;
mod session;
mod store;
mod verifier;

pub use clock::{Clock, ManualClock, SystemClock};
pub use desk::{AttendanceDesk, CheckIn};
pub use error::{CheckInError, RecordError, SessionError, StoreError};
pub use issuer::SessionIssuer;
pub use memory::MemoryStore;
pub use recorder::{AttendanceMark, AttendanceRecorder, MemoryRecorder};
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use session::{
    CurrentPointer, IssuedSession, SessionConfig, SessionRecord,
    VerifiedSession,
};
pub use store::ExpiringStore;
pub use verifier::SessionVerifier;
