//! The display rotation convention.
//!
//! A presenter shows several visually different QR codes during one
//! session window so that a screenshot taken early looks different from
//! the code on screen later. Each code carries
//! `<sessionId>_shuffle_<index>`. This is presentation only: the session
//! state machine never sees the suffix, because every presented id is
//! normalized back to its base before lookup.

use crate::SessionId;

/// Separator between the base session id and the rotation index.
pub const SHUFFLE_MARKER: &str = "_shuffle_";

impl SessionId {
    /// Builds the rotated display form for slot `index`.
    pub fn rotated(&self, index: u32) -> String {
        format!("{}{SHUFFLE_MARKER}{index}", self.as_str())
    }

    /// Strips any rotation suffix from a presented id.
    ///
    /// Text after the first marker is discarded, matching what scanner
    /// clients already do. Surrounding whitespace from the scanner is
    /// trimmed. An id without a marker is returned as-is.
    pub fn normalize(presented: &str) -> SessionId {
        let trimmed = presented.trim();
        let base = match trimmed.split_once(SHUFFLE_MARKER) {
            Some((base, _)) => base,
            None => trimmed,
        };
        SessionId::new(base)
    }
}

/// Extracts the rotation index from a presented id, if it has a
/// well-formed one.
pub fn shuffle_index(presented: &str) -> Option<u32> {
    presented
        .trim()
        .split_once(SHUFFLE_MARKER)
        .and_then(|(_, index)| index.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotated_appends_marker_and_index() {
        let id = SessionId::new("9f2c");
        assert_eq!(id.rotated(3), "9f2c_shuffle_3");
    }

    #[test]
    fn test_normalize_strips_suffix() {
        assert_eq!(SessionId::normalize("9f2c_shuffle_3"), SessionId::new("9f2c"));
    }

    #[test]
    fn test_normalize_plain_id_is_unchanged() {
        assert_eq!(SessionId::normalize("9f2c"), SessionId::new("9f2c"));
    }

    #[test]
    fn test_normalize_trims_scanner_whitespace() {
        assert_eq!(SessionId::normalize("  9f2c_shuffle_0\n"), SessionId::new("9f2c"));
    }

    #[test]
    fn test_normalize_every_rotation_yields_same_base() {
        let base = SessionId::new("0123456789abcdef0123456789abcdef");
        for index in 0..6 {
            assert_eq!(SessionId::normalize(&base.rotated(index)), base);
        }
    }

    #[test]
    fn test_normalize_non_numeric_suffix_still_strips() {
        assert_eq!(SessionId::normalize("abc_shuffle_x"), SessionId::new("abc"));
    }

    #[test]
    fn test_shuffle_index_parses_suffix() {
        assert_eq!(shuffle_index("abc_shuffle_4"), Some(4));
        assert_eq!(shuffle_index("abc"), None);
        assert_eq!(shuffle_index("abc_shuffle_x"), None);
    }
}
