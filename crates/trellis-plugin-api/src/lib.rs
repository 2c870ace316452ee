//! trellis-plugin-api — the API shim loaded inside each plugin sandbox.
//!
//! Plugin bundles implement [`PluginEntry`] and talk to the host through
//! the injected [`PluginApi`] capability object: `register` an extension
//! point, `subscribe` to topics, report heights with `set_height`, push
//! data with `publish`. Every call becomes a serialized protocol message;
//! the shim depends on the wire protocol only and never on host
//! internals, so a bundle compiled against this crate cannot reach
//! anything the message channel does not carry.

pub mod api;
pub mod entry;
pub mod error;
pub mod events;
pub mod root;
pub mod runtime;

pub use api::PluginApi;
pub use entry::PluginEntry;
pub use error::PluginApiError;
pub use events::DataEvent;
pub use root::RenderRoot;
