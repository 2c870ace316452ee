//! trellis-protocol — wire-level types for the plugin messaging protocol.
//!
//! The host and each plugin sandbox exchange serialized JSON frames over
//! an asynchronous channel; this crate defines the closed set of message
//! kinds, the envelope carrying the per-instance sequence number, and the
//! helpers both sides use to assign and validate sequence numbers. It has
//! no knowledge of host internals and is the only dependency the
//! plugin-side shim shares with the host.

pub mod error;
pub mod message;

pub use error::ProtocolError;
pub use message::{Envelope, Message, SeqCounter, SeqTracker, PROTOCOL_VERSION};
