//! trellis-host — the embedding side of the plugin system.
//!
//! The host loads plugin manifests, runs each plugin instance in its own
//! sandbox, mediates every byte that crosses the boundary, and keeps the
//! page layout calm while plugins size themselves. The pieces:
//!
//! - [`manifest`] / [`registry`]: what plugins exist and what they may do
//! - [`sandbox`]: one isolated execution context per instance
//! - [`bus`]: latest-value topic pub/sub between host and plugins
//! - [`delivery`]: per-instance FIFO queues with snapshot coalescing
//! - [`slots`]: reserved rendering regions and debounced height layout
//! - [`host`]: the orchestrator tying it all together
//!
//! A typical embedding builds a [`PluginRegistry`] from a manifest file,
//! supplies a [`sandbox::BundleLoader`] and a [`slots::SlotShell`], and
//! drives a [`PluginHost`] through `start`/`navigate`/`shutdown`.

pub mod bus;
pub mod config;
pub mod delivery;
pub mod error;
pub mod host;
pub mod instance;
pub mod manifest;
pub mod registry;
pub mod sandbox;
pub mod slots;

pub use bus::TopicBus;
pub use config::HostConfig;
pub use error::HostError;
pub use host::PluginHost;
pub use instance::{InstanceId, InstanceState, PluginInstance};
pub use manifest::{PluginManifest, PluginManifestEntry};
pub use registry::PluginRegistry;
pub use sandbox::{BundleLoader, SandboxHost, StaticBundleLoader};
pub use slots::{HeadlessRegion, HeadlessShell, SlotLayout, SlotRegion, SlotShell, SlotState};
