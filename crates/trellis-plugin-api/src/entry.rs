//! The trait plugin bundles implement.

use crate::api::PluginApi;
use crate::error::PluginApiError;

/// Entry point of a plugin bundle.
///
/// `start` runs exactly once, on the sandbox task, when the sandbox spins
/// up. It is where a bundle calls [`PluginApi::register`] and installs its
/// subscription callbacks; afterwards the sandbox runtime keeps the
/// callbacks alive and feeds them inbound events. Returning an error
/// counts as a failed load and tears the sandbox down.
pub trait PluginEntry: Send {
    fn start(&self, api: &PluginApi) -> Result<(), PluginApiError>;
}

/// Blanket impl so simple bundles can be written as closures.
impl<F> PluginEntry for F
where
    F: Fn(&PluginApi) -> Result<(), PluginApiError> + Send,
{
    fn start(&self, api: &PluginApi) -> Result<(), PluginApiError> {
        self(api)
    }
}
