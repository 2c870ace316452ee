//! Host configuration.

use std::time::Duration;

/// Tunable knobs for the plugin host.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Budget for loading a plugin bundle and receiving its `Register`
    /// message, in milliseconds (default: 5000).
    pub load_timeout_ms: u64,
    /// Window for coalescing rapid `SetHeight` reports into one layout
    /// pass, in milliseconds (default: 25).
    pub layout_debounce_ms: u64,
    /// Whether malformed inbound frames are answered with an `Error`
    /// message in addition to being logged (default: true).
    pub echo_protocol_errors: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            load_timeout_ms: 5000,
            layout_debounce_ms: 25,
            echo_protocol_errors: true,
        }
    }
}

impl HostConfig {
    /// Build config from environment variables, falling back to defaults
    /// for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            load_timeout_ms: std::env::var("TRELLIS_LOAD_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.load_timeout_ms),
            layout_debounce_ms: std::env::var("TRELLIS_LAYOUT_DEBOUNCE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.layout_debounce_ms),
            echo_protocol_errors: std::env::var("TRELLIS_ECHO_PROTOCOL_ERRORS")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.echo_protocol_errors),
        }
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn layout_debounce(&self) -> Duration {
        Duration::from_millis(self.layout_debounce_ms)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
