//! Sandbox-side runtime loop.
//!
//! The host spawns one task per sandbox running [`run`]: it starts the
//! plugin bundle once, then pumps inbound frames into the API object's
//! dispatch until the host closes the channel. Nothing in here touches
//! host state; the frame channel is the entire boundary.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use trellis_protocol::{Envelope, SeqTracker};

use crate::api::PluginApi;
use crate::entry::PluginEntry;

/// Drive one sandbox to completion.
///
/// Returns when the host closes the inbound channel (teardown) or after
/// a failed start. Dropping `api` on exit closes the sandbox→host channel,
/// which is how the host observes the sandbox ending.
pub async fn run(entry: Box<dyn PluginEntry>, api: PluginApi, mut inbound: mpsc::Receiver<Vec<u8>>) {
    if let Err(e) = entry.start(&api) {
        warn!(plugin = %api.plugin_id(), error = %e, "plugin entry failed to start");
        api.report_error(format!("start failed: {e}"));
        return;
    }

    let mut tracker = SeqTracker::new();
    while let Some(frame) = inbound.recv().await {
        let envelope = match Envelope::decode(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(plugin = %api.plugin_id(), error = %e, "malformed frame from host, dropped");
                continue;
            }
        };
        if let Err(e) = tracker.accept(envelope.seq) {
            warn!(plugin = %api.plugin_id(), error = %e, "out-of-order frame from host, dropped");
            continue;
        }
        api.dispatch(envelope.message);
    }

    debug!(plugin = %api.plugin_id(), "inbound channel closed, sandbox runtime exiting");
}

// ─── Tests ───────────────────────────────────────────────────────────
