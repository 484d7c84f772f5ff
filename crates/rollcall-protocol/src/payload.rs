//! What a QR code carries.
//!
//! [`render_qr_data_url`](crate::render_qr_data_url) draws
//! [`ScanPayload::encode`] as a QR image. The token is a compact
//! base64url string of a small JSON object, short
//! enough for a low-density code that phone cameras read quickly.
//!
//! Scanners are less uniform than presenters, so [`ScanPayload::decode`]
//! is lenient: it accepts the base64url token, the raw JSON object, or a
//! bare session id (possibly rotated).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::{EventId, ProtocolError, SessionId, shuffle_index};

/// The decoded contents of a scanned code.
///
/// Field names are camelCase on the wire because that is what the
/// existing web scanner already parses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanPayload {
    /// Presented id, either the base id or a rotated variant.
    pub session_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shuffle_index: Option<u32>,
}

impl ScanPayload {
    /// Payload for the base (unrotated) session code.
    pub fn for_session(session_id: &SessionId, event_id: &EventId) -> Self {
        Self {
            session_id: session_id.as_str().to_owned(),
            event_id: Some(event_id.clone()),
            shuffle_index: None,
        }
    }

    /// Payload for rotation slot `index` of a session.
    pub fn for_rotation(
        session_id: &SessionId,
        event_id: &EventId,
        index: u32,
    ) -> Self {
        Self {
            session_id: session_id.rotated(index),
            event_id: Some(event_id.clone()),
            shuffle_index: Some(index),
        }
    }

    /// Serializes to JSON and wraps it in unpadded base64url.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let json = serde_json::to_vec(self).map_err(ProtocolError::Encode)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Parses whatever a scanner read off a code.
    ///
    /// Tried in order: a JSON object, a base64url token holding a JSON
    /// object, a bare id. A bare hex id is itself valid base64url, so the
    /// token attempt only wins when its bytes parse as a payload.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidPayload`] for empty input or a bare id
    /// that normalizes to nothing; [`ProtocolError::Decode`] for text that
    /// starts like JSON but isn't a payload.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ProtocolError::InvalidPayload("empty scan".into()));
        }

        if text.starts_with('{') {
            return serde_json::from_str(text).map_err(ProtocolError::Decode);
        }

        if let Ok(bytes) = URL_SAFE_NO_PAD.decode(text) {
            if let Ok(payload) = serde_json::from_slice::<ScanPayload>(&bytes) {
                return Ok(payload);
            }
        }

        if SessionId::normalize(text).is_empty() {
            return Err(ProtocolError::InvalidPayload(format!(
                "no session id in {text:?}"
            )));
        }
        Ok(Self {
            session_id: text.to_owned(),
            event_id: None,
            shuffle_index: shuffle_index(text),
        })
    }

    /// The base session id this payload refers to.
    pub fn base_session_id(&self) -> SessionId {
        SessionId::normalize(&self.session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid() -> SessionId {
        SessionId::new("0123456789abcdef0123456789abcdef")
    }

    fn eid() -> EventId {
        EventId::new("attend2025")
    }

    #[test]
    fn test_encode_is_url_safe_without_padding() {
        let token = ScanPayload::for_session(&sid(), &eid()).encode().unwrap();
        assert!(!token.contains('='));
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
    }

    #[test]
    fn test_decode_encoded_rotation_keeps_index() {
        let token = ScanPayload::for_rotation(&sid(), &eid(), 2).encode().unwrap();
        let payload = ScanPayload::decode(&token).unwrap();
        assert_eq!(payload.shuffle_index, Some(2));
        assert_eq!(payload.base_session_id(), sid());
        assert_eq!(payload.event_id, Some(eid()));
    }

    #[test]
    fn test_decode_raw_json_from_legacy_scanner() {
        let payload = ScanPayload::decode(
            r#"{"sessionId":"abc_shuffle_1","shuffleIndex":1,"baseSessionId":"abc"}"#,
        )
        .unwrap();
        assert_eq!(payload.base_session_id(), SessionId::new("abc"));
        assert_eq!(payload.shuffle_index, Some(1));
    }

    #[test]
    fn test_decode_bare_hex_id_is_not_mistaken_for_token() {
        let payload = ScanPayload::decode(sid().as_str()).unwrap();
        assert_eq!(payload.base_session_id(), sid());
        assert_eq!(payload.event_id, None);
    }

    #[test]
    fn test_decode_bare_rotated_id_reads_index() {
        let payload = ScanPayload::decode(&sid().rotated(5)).unwrap();
        assert_eq!(payload.base_session_id(), sid());
        assert_eq!(payload.shuffle_index, Some(5));
    }

    #[test]
    fn test_decode_empty_returns_invalid_payload() {
        let result = ScanPayload::decode("   ");
        assert!(matches!(result, Err(ProtocolError::InvalidPayload(_))));
    }

    #[test]
    fn test_decode_only_suffix_returns_invalid_payload() {
        let result = ScanPayload::decode("_shuffle_2");
        assert!(matches!(result, Err(ProtocolError::InvalidPayload(_))));
    }

    #[test]
    fn test_decode_broken_json_returns_decode_error() {
        let result = ScanPayload::decode("{\"sessionId\":");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
