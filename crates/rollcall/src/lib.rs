//! # Rollcall
//!
//! QR attendance session server.
//!
//! A presenter page shows a QR code that changes every few seconds;
//! students scan it with the scanner app, which submits the scan here.
//! Rollcall keeps exactly one session live at a time in a shared
//! expiring store, verifies scans against it, and records attendance.
//!
//! ```text
//! presenter ─ IssueSession / WatchCodes ─┐
//!                                        ├─→ RollcallServer ─→ ExpiringStore
//! scanners  ─ Verify / Scan ─────────────┘         │
//!                                                  └─→ AttendanceRecorder
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use rollcall::prelude::*;
//!
//! # async fn start() -> Result<(), RollcallError> {
//! let server = RollcallServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .presenter(CadenceConfig::default())
//!     .build(Arc::new(MemoryStore::new()), Arc::new(MemoryRecorder::new()))
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod presenter;
mod server;
mod transport;

pub use error::RollcallError;
pub use server::{RollcallServer, RollcallServerBuilder};
pub use transport::{
    ConnectionId, PendingConnection, TransportError, WsConnection, WsListener,
};

/// Everything needed to embed a server.
pub mod prelude {
    pub use crate::{RollcallError, RollcallServer, RollcallServerBuilder};
    pub use rollcall_cadence::{CadenceConfig, MissPolicy};
    pub use rollcall_protocol::{
        ClientMessage, CourseId, DisplayCode, EventId, RecordOutcome,
        RejectReason, ServerMessage, SessionId, StudentId,
    };
    pub use rollcall_session::{
        AttendanceMark, AttendanceRecorder, Clock, ExpiringStore, ManualClock,
        MemoryRecorder, MemoryStore, RecordError, SessionConfig, StoreError,
        SystemClock,
    };
    #[cfg(feature = "redis")]
    pub use rollcall_session::RedisStore;
}
