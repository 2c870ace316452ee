//! Wire-level message types exchanged across the sandbox boundary.
//!
//! Every frame is a JSON object with a `kind` tag, a per-instance
//! monotonic `seq`, and the fields of its kind (camelCase on the wire).
//! The kind set is closed: a frame with an unknown tag fails to decode
//! and is rejected at the boundary instead of being silently ignored.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Protocol revision carried for diagnostics and future negotiation.
pub const PROTOCOL_VERSION: u32 = 1;

/// Message kinds exchanged between the host and a plugin sandbox.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all_fields = "camelCase")]
pub enum Message {
    /// Plugin declares which extension point it implements
    Register { extension_point_id: String },
    /// Plugin asks for future snapshots of the listed topics
    Subscribe { topics: Vec<String> },
    /// Plugin drops its interest in the listed topics
    Unsubscribe { topics: Vec<String> },
    /// A topic snapshot; host→sandbox it is a delivery, sandbox→host a publish
    DataEvent {
        topic: String,
        payload: serde_json::Value,
    },
    /// Plugin reports its rendered height in pixels
    SetHeight { height_px: f64 },
    /// Failure report, travelling in either direction
    Error { reason: String },
}

impl Message {
    /// Kind tag as it appears on the wire, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Register { .. } => "Register",
            Message::Subscribe { .. } => "Subscribe",
            Message::Unsubscribe { .. } => "Unsubscribe",
            Message::DataEvent { .. } => "DataEvent",
            Message::SetHeight { .. } => "SetHeight",
            Message::Error { .. } => "Error",
        }
    }
}

/// A [`Message`] plus the per-instance sequence number it was sent with.
///
/// The seq is assigned by the sending side when the frame is encoded and
/// must be strictly increasing within one instance and direction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope {
    pub seq: u64,
    #[serde(flatten)]
    pub message: Message,
}

impl Envelope {
    pub fn new(seq: u64, message: Message) -> Self {
        Self { seq, message }
    }

    /// Serialize into the JSON frame sent over the sandbox channel.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a frame received from the sandbox channel.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Hands out the next outbound sequence number, starting at 1.
#[derive(Debug, Default)]
pub struct SeqCounter(AtomicU64);

impl SeqCounter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Validates that inbound sequence numbers are strictly increasing.
#[derive(Debug, Default)]
pub struct SeqTracker {
    last: u64,
}

impl SeqTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `seq` if it is greater than everything seen so far.
    pub fn accept(&mut self, seq: u64) -> Result<(), ProtocolError> {
        if seq <= self.last {
            return Err(ProtocolError::NonMonotonicSeq {
                last: self.last,
                got: seq,
            });
        }
        self.last = seq;
        Ok(())
    }

    pub fn last(&self) -> u64 {
        self.last
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
