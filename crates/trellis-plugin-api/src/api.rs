//! The capability object exposed to plugin code.
//!
//! Each sandbox receives its own `PluginApi`, scoped to one plugin
//! instance's identity. There is no process-wide namespace: two plugins
//! sharing a host process still cannot reach each other's API object.
//! Every method translates into a protocol message; nothing here calls
//! into host internals.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use trellis_protocol::{Envelope, Message, SeqCounter};

use crate::events::DataEvent;
use crate::root::RenderRoot;

type TopicCallback = Arc<Mutex<Box<dyn FnMut(&DataEvent) + Send>>>;
type ErrorHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Handle plugin code uses to talk to the host.
///
/// All methods are non-blocking: they enqueue a message and return.
/// Results, when there are any, arrive later as separately dispatched
/// messages. Cloning is cheap and clones share the same identity and
/// subscription table, so callbacks can capture a clone to call the API
/// from inside event handling.
#[derive(Clone)]
pub struct PluginApi {
    inner: Arc<ApiInner>,
}

struct ApiInner {
    plugin_id: String,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    seq: SeqCounter,
    subscriptions: Mutex<HashMap<String, TopicCallback>>,
    error_hook: Mutex<Option<ErrorHook>>,
    root: RenderRoot,
}

impl PluginApi {
    /// Build the API object for one sandbox.
    ///
    /// `outbound` is the sandbox→host half of the frame channel; the host
    /// constructs it when it spins the sandbox up.
    pub fn new(plugin_id: impl Into<String>, outbound: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self {
            inner: Arc::new(ApiInner {
                plugin_id: plugin_id.into(),
                outbound,
                seq: SeqCounter::new(),
                subscriptions: Mutex::new(HashMap::new()),
                error_hook: Mutex::new(None),
                root: RenderRoot::new(),
            }),
        }
    }

    // ── Plugin-facing surface ────────────────────────────────────────

    /// Declare which extension point this plugin implements, then run the
    /// mount callback against the sandbox-local [`RenderRoot`].
    ///
    /// Admission is decided host-side; an ungranted extension point comes
    /// back as an `Error` message (see [`PluginApi::on_error`]), never as
    /// an exception in plugin code, and the plugin may register again.
    pub fn register(&self, extension_point_id: impl Into<String>, mount: impl FnOnce(&RenderRoot)) {
        let extension_point = extension_point_id.into();
        debug!(
            plugin = %self.inner.plugin_id,
            extension_point = %extension_point,
            "registering extension point"
        );
        self.send(Message::Register {
            extension_point_id: extension_point,
        });
        mount(&self.inner.root);
    }

    /// Subscribe to topics; `callback` runs for every delivered snapshot
    /// whose topic is in `topics`.
    ///
    /// Subscribing again with overlapping topics replaces the callback
    /// for those topics instead of stacking a second one.
    pub fn subscribe(&self, topics: &[&str], callback: impl FnMut(&DataEvent) + Send + 'static) {
        let shared: TopicCallback = Arc::new(Mutex::new(Box::new(callback)));
        {
            let mut subs = self.inner.subscriptions.lock().unwrap();
            for topic in topics {
                subs.insert((*topic).to_string(), Arc::clone(&shared));
            }
        }
        self.send(Message::Subscribe {
            topics: topics.iter().map(|t| (*t).to_string()).collect(),
        });
    }

    /// Drop interest in the listed topics. Unknown topics are ignored.
    pub fn unsubscribe(&self, topics: &[&str]) {
        {
            let mut subs = self.inner.subscriptions.lock().unwrap();
            for topic in topics {
                subs.remove(*topic);
            }
        }
        self.send(Message::Unsubscribe {
            topics: topics.iter().map(|t| (*t).to_string()).collect(),
        });
    }

    /// Report the plugin's rendered height.
    ///
    /// Passing `None` measures the [`RenderRoot`]'s intrinsic height and
    /// reports that instead.
    pub fn set_height(&self, px: impl Into<Option<f64>>) {
        let height_px = px.into().unwrap_or_else(|| self.inner.root.natural_height());
        self.send(Message::SetHeight { height_px });
    }

    /// Push a snapshot into a host topic, subject to the manifest's
    /// publish grants. Denials come back as `Error` messages.
    pub fn publish(&self, topic: impl Into<String>, payload: serde_json::Value) {
        self.send(Message::DataEvent {
            topic: topic.into(),
            payload,
        });
    }

    /// Report a plugin-side failure to the host for operator diagnostics.
    pub fn report_error(&self, reason: impl Into<String>) {
        self.send(Message::Error {
            reason: reason.into(),
        });
    }

    /// Install the handler for `Error` messages echoed by the host.
    /// Without one they are only logged.
    pub fn on_error(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self.inner.error_hook.lock().unwrap() = Some(Arc::new(hook));
    }

    /// The sandbox-local surface the mount callback renders into.
    pub fn root(&self) -> &RenderRoot {
        &self.inner.root
    }

    /// Manifest id of the plugin this sandbox runs.
    pub fn plugin_id(&self) -> &str {
        &self.inner.plugin_id
    }

    // ── Runtime plumbing ─────────────────────────────────────────────

    fn send(&self, message: Message) {
        let envelope = Envelope::new(self.inner.seq.next(), message);
        match envelope.encode() {
            Ok(frame) => {
                if self.inner.outbound.send(frame).is_err() {
                    debug!(
                        plugin = %self.inner.plugin_id,
                        kind = envelope.message.kind(),
                        "host channel closed, outbound message dropped"
                    );
                }
            }
            Err(e) => {
                warn!(
                    plugin = %self.inner.plugin_id,
                    error = %e,
                    "failed to encode outbound message"
                );
            }
        }
    }

    /// Route one decoded host→sandbox message. Called by the runtime pump.
    pub(crate) fn dispatch(&self, message: Message) {
        match message {
            Message::DataEvent { topic, payload } => {
                let callback = self.inner.subscriptions.lock().unwrap().get(&topic).cloned();
                match callback {
                    Some(callback) => {
                        let event = DataEvent::new(topic, payload);
                        // Table lock already released: the callback may
                        // subscribe or unsubscribe re-entrantly.
                        (*callback.lock().unwrap())(&event);
                    }
                    None => {
                        debug!(
                            plugin = %self.inner.plugin_id,
                            topic = %topic,
                            "delivery for topic with no local callback, dropped"
                        );
                    }
                }
            }
            Message::Error { reason } => {
                let hook = self.inner.error_hook.lock().unwrap().clone();
                match hook {
                    Some(hook) => hook(&reason),
                    None => {
                        warn!(plugin = %self.inner.plugin_id, reason = %reason, "host reported error")
                    }
                }
            }
            other => {
                // Host→sandbox traffic is deliveries and errors only;
                // anything else is a protocol violation.
                warn!(
                    plugin = %self.inner.plugin_id,
                    kind = other.kind(),
                    "unexpected message kind in sandbox, dropped"
                );
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
