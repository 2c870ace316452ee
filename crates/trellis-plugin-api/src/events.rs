//! Events delivered to plugin subscription callbacks.

use serde::{Deserialize, Serialize};

/// A topic snapshot handed to a subscription callback.
///
/// `data` is the payload exactly as the producer published it; the
/// messaging layer never inspects its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataEvent {
    pub topic: String,
    pub data: serde_json::Value,
}

impl DataEvent {
    pub fn new(topic: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            data,
        }
    }
}
