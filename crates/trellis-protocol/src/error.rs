//! Protocol error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("non-monotonic sequence number: got {got}, last accepted was {last}")]
    NonMonotonicSeq { last: u64, got: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Display messages ──────────────────────────────────────────────

    #[test]
    fn test_display_non_monotonic_seq() {
        let err = ProtocolError::NonMonotonicSeq { last: 9, got: 3 };
        assert_eq!(
            err.to_string(),
            "non-monotonic sequence number: got 3, last accepted was 9"
        );
    }

    // ── From conversions ──────────────────────────────────────────────

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<String>("not json{{{").unwrap_err();
        let err: ProtocolError = json_err.into();
        assert!(matches!(err, ProtocolError::Serialization(_)));
        assert!(err.to_string().starts_with("serialization error:"));
    }

    // ── Error trait source chain ──────────────────────────────────────

    #[test]
    fn test_error_source() {
        use std::error::Error;
        let json_err = serde_json::from_str::<String>("{").unwrap_err();
        let err: ProtocolError = json_err.into();
        assert!(err.source().is_some());

        let err = ProtocolError::NonMonotonicSeq { last: 1, got: 1 };
        assert!(err.source().is_none());
    }
}
