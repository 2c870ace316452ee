//! Host-side error types.

use thiserror::Error;

use trellis_protocol::ProtocolError;

/// Errors produced by the plugin host.
///
/// None of these ever abort host rendering: manifest failures exclude the
/// offending plugin, load failures retire one instance, and capability or
/// protocol violations are dropped at the sandbox boundary.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("sandbox load error: {0}")]
    SandboxLoad(String),

    #[error("sandbox load timed out after {0} ms")]
    LoadTimeout(u64),

    #[error("capability denied: {0}")]
    Capability(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    // ── Display messages ──────────────────────────────────────────────

    #[test]
    fn test_display_manifest() {
        let err = HostError::Manifest("duplicate plugin id 'notes'".into());
        assert_eq!(err.to_string(), "manifest error: duplicate plugin id 'notes'");
    }

    #[test]
    fn test_display_load_timeout() {
        let err = HostError::LoadTimeout(5000);
        assert_eq!(err.to_string(), "sandbox load timed out after 5000 ms");
    }

    #[test]
    fn test_display_capability() {
        let err = HostError::Capability("publish to 'metadata' not granted".into());
        assert_eq!(
            err.to_string(),
            "capability denied: publish to 'metadata' not granted"
        );
    }

    #[test]
    fn test_display_instance_not_found() {
        let err = HostError::InstanceNotFound("abc".into());
        assert_eq!(err.to_string(), "instance not found: abc");
    }

    // ── From conversions ──────────────────────────────────────────────

    #[test]
    fn test_from_protocol_error() {
        let proto = ProtocolError::NonMonotonicSeq { last: 4, got: 2 };
        let err: HostError = proto.into();
        assert!(matches!(err, HostError::Protocol(_)));
        assert!(err.to_string().starts_with("protocol error:"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "manifest missing");
        let err: HostError = io_err.into();
        assert!(matches!(err, HostError::Io(_)));
        assert!(err.to_string().contains("manifest missing"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= bad").unwrap_err();
        let err: HostError = toml_err.into();
        assert!(matches!(err, HostError::TomlParse(_)));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<String>("{{").unwrap_err();
        let err: HostError = json_err.into();
        assert!(matches!(err, HostError::Serialization(_)));
    }

    // ── Error trait source chain ──────────────────────────────────────

    #[test]
    fn test_error_source() {
        use std::error::Error;
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe broken");
        let err: HostError = io_err.into();
        assert!(err.source().is_some());

        let err = HostError::Manifest("x".into());
        assert!(err.source().is_none());
    }
}
