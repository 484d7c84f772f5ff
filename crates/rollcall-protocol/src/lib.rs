//! Wire protocol for Rollcall.
//!
//! This crate defines everything that crosses a process boundary:
//!
//! - **Identifiers** ([`SessionId`], [`EventId`], [`StudentId`],
//!   [`CourseId`]): string newtypes so a student id can never be passed
//!   where a session id is expected.
//! - **Rotation** ([`SHUFFLE_MARKER`], [`SessionId::rotated`],
//!   [`SessionId::normalize`]): the display-only
//!   `<sessionId>_shuffle_<index>` convention.
//! - **Scan payloads** ([`ScanPayload`]): what a QR code actually carries,
//!   and [`render_qr_data_url`], which draws it.
//! - **Messages** ([`ClientMessage`], [`ServerMessage`]) and the
//!   [`Codec`] that turns them into text frames.
//!
//! ```text
//! Transport (text frames) → Protocol (messages, payloads) → Session (issue / verify)
//! ```

mod codec;
mod error;
mod image;
mod payload;
mod rotation;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use image::{QR_DATA_URL_PREFIX, render_qr_data_url};
pub use payload::ScanPayload;
pub use rotation::{SHUFFLE_MARKER, shuffle_index};
pub use types::{
    ClientMessage, CourseId, DisplayCode, EventId, RecordOutcome,
    RejectReason, ServerMessage, SessionId, StudentId,
};
