//! Unified error type for the Rollcall server.

use rollcall_protocol::ProtocolError;
use rollcall_session::{CheckInError, RecordError, SessionError, StoreError};

use crate::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum RollcallError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, bad payload).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The session store could not be reached at startup.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Issuing or verifying a session failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The attendance recorder failed.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// The scan-to-mark flow failed.
    #[error(transparent)]
    CheckIn(#[from] CheckInError),
}
