//! Plugin-side error types.

use thiserror::Error;

/// Errors a plugin bundle can surface from its own code.
///
/// The messaging API itself is fire-and-forget and never returns errors
/// to plugin code; this type exists for [`crate::PluginEntry::start`] so
/// a bundle that cannot initialize has something typed to say about it.
#[derive(Error, Debug)]
pub enum PluginApiError {
    #[error("plugin startup failed: {0}")]
    Startup(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
