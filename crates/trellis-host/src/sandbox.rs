//! Sandbox host — one isolated execution context per plugin instance.
//!
//! A sandbox is a tokio task running the plugin bundle's entry and the
//! shim's pump loop. The host reaches it only through two channels
//! carrying serialized JSON frames: host→sandbox rides a capacity-1 frame
//! channel fed by the instance's delivery queue (so undrained traffic
//! backs up where coalescing applies), sandbox→host is unbounded so
//! plugin calls enqueue and return. No structure is ever shared across
//! the boundary, and a crash or hang inside one sandbox cannot reach the
//! host or any other sandbox.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use trellis_plugin_api::{runtime, PluginApi, PluginEntry};
use trellis_protocol::{Envelope, Message, ProtocolError, SeqTracker};

use crate::config::HostConfig;
use crate::delivery::DeliveryQueue;
use crate::error::HostError;
use crate::instance::{InstanceId, InstanceShared, InstanceState, PluginInstance};
use crate::manifest::PluginManifestEntry;

// ─── Bundle loading ─────────────────────────────────────────────────

/// Resolves a manifest entry's `entry_url` to runnable plugin code.
///
/// Loader time counts against the sandbox load timeout.
#[async_trait]
pub trait BundleLoader: Send + Sync {
    async fn load(&self, entry: &PluginManifestEntry) -> Result<Box<dyn PluginEntry>, HostError>;
}

type BundleFactory = Box<dyn Fn() -> Box<dyn PluginEntry> + Send + Sync>;

/// In-process loader mapping exact entry URLs to bundle factories. This
/// is what embedding hosts register their compiled-in plugins with, and
/// what tests use for fixtures.
#[derive(Default)]
pub struct StaticBundleLoader {
    bundles: Mutex<HashMap<String, BundleFactory>>,
}

impl StaticBundleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for an exact entry URL.
    pub fn register(
        &self,
        entry_url: impl Into<String>,
        factory: impl Fn() -> Box<dyn PluginEntry> + Send + Sync + 'static,
    ) {
        self.bundles
            .lock()
            .unwrap()
            .insert(entry_url.into(), Box::new(factory));
    }
}

#[async_trait]
impl BundleLoader for StaticBundleLoader {
    async fn load(&self, entry: &PluginManifestEntry) -> Result<Box<dyn PluginEntry>, HostError> {
        let bundles = self.bundles.lock().unwrap();
        match bundles.get(&entry.entry_url) {
            Some(factory) => Ok(factory()),
            None => Err(HostError::SandboxLoad(format!(
                "no bundle registered for entry url '{}'",
                entry.entry_url
            ))),
        }
    }
}

// ─── Inbound dispatch ───────────────────────────────────────────────

/// Host-side handler for traffic arriving from one sandbox.
///
/// Invoked on that instance's reader task, so a slow handler never blocks
/// delivery for other sandboxes.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn on_message(&self, id: InstanceId, message: Message);
    /// The sandbox channel closed without teardown — the crash path.
    async fn on_disconnect(&self, id: InstanceId);
}

/// Decode one inbound frame and validate its sequence number.
fn decode_inbound(frame: &[u8], tracker: &mut SeqTracker) -> Result<Message, ProtocolError> {
    let envelope = Envelope::decode(frame)?;
    tracker.accept(envelope.seq)?;
    Ok(envelope.message)
}

// ─── Instance table ─────────────────────────────────────────────────

/// Inbound channel state before `on_message` wiring.
struct PendingReader {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    tracker: SeqTracker,
    /// Non-register messages the plugin sent during startup, replayed to
    /// the handler once installed.
    stashed: Vec<Message>,
}

struct SandboxRuntime {
    queue: Arc<DeliveryQueue>,
    sandbox_task: JoinHandle<()>,
    drain_task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
    pending: Option<PendingReader>,
    reader_task: Option<JoinHandle<()>>,
}

struct SandboxEntry {
    shared: Arc<InstanceShared>,
    /// `None` once the instance failed to load or finished teardown.
    runtime: Option<SandboxRuntime>,
}

/// Creates, tracks, and tears down plugin sandboxes.
pub struct SandboxHost {
    config: HostConfig,
    loader: Arc<dyn BundleLoader>,
    instances: RwLock<HashMap<InstanceId, SandboxEntry>>,
}

impl SandboxHost {
    pub fn new(config: HostConfig, loader: Arc<dyn BundleLoader>) -> Self {
        Self {
            config,
            loader,
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Load a plugin bundle into a new sandbox and wait for it to claim
    /// `extension_point` with a `Register` message.
    ///
    /// The whole sequence — bundle resolution, entry start, register —
    /// shares one load-timeout budget. On any failure the instance is
    /// recorded `Failed` and the rest of the host is unaffected. A
    /// `Register` for an ungranted extension point is answered with an
    /// `Error` message and the wait continues, so a plugin may correct
    /// itself before the deadline.
    pub async fn create(
        &self,
        id: InstanceId,
        entry: Arc<PluginManifestEntry>,
        extension_point: &str,
    ) -> Result<PluginInstance, HostError> {
        let shared = Arc::new(InstanceShared::new(id, entry.clone(), extension_point));
        let deadline = tokio::time::Instant::now() + self.config.load_timeout();

        let bundle = match tokio::time::timeout_at(deadline, self.loader.load(&entry)).await {
            Ok(Ok(bundle)) => bundle,
            Ok(Err(e)) => return Err(self.record_failed(shared, e).await),
            Err(_) => {
                let e = HostError::LoadTimeout(self.config.load_timeout_ms);
                return Err(self.record_failed(shared, e).await);
            }
        };

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (in_tx, in_rx) = mpsc::channel::<Vec<u8>>(1);
        let api = PluginApi::new(entry.id.clone(), out_tx);
        let queue = Arc::new(DeliveryQueue::new());

        let sandbox_task = tokio::spawn(runtime::run(bundle, api, in_rx));
        let drain_task = {
            let queue = Arc::clone(&queue);
            let plugin_id = entry.id.clone();
            tokio::spawn(async move {
                while let Some(message) = queue.recv().await {
                    let frame = match queue.encode(message) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(plugin = %plugin_id, error = %e, "failed to encode outbound frame");
                            continue;
                        }
                    };
                    if in_tx.send(frame).await.is_err() {
                        break;
                    }
                }
            })
        };

        let mut tracker = SeqTracker::new();
        let mut stashed = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, out_rx.recv()).await {
                Ok(Some(frame)) => {
                    let message = match decode_inbound(&frame, &mut tracker) {
                        Ok(message) => message,
                        Err(e) => {
                            warn!(
                                instance = %id,
                                plugin = %entry.id,
                                error = %e,
                                "malformed frame during load, dropped"
                            );
                            if self.config.echo_protocol_errors {
                                queue.enqueue(Message::Error {
                                    reason: format!("protocol error: {e}"),
                                });
                            }
                            continue;
                        }
                    };
                    match message {
                        Message::Register { extension_point_id }
                            if extension_point_id == extension_point =>
                        {
                            shared.transition(InstanceState::Mounted);
                            info!(
                                instance = %id,
                                plugin = %entry.id,
                                extension_point = %extension_point,
                                "plugin mounted"
                            );
                            let (shutdown, _) = watch::channel(false);
                            let runtime = SandboxRuntime {
                                queue,
                                sandbox_task,
                                drain_task,
                                shutdown,
                                pending: Some(PendingReader {
                                    rx: out_rx,
                                    tracker,
                                    stashed,
                                }),
                                reader_task: None,
                            };
                            self.instances.write().await.insert(
                                id,
                                SandboxEntry {
                                    shared: Arc::clone(&shared),
                                    runtime: Some(runtime),
                                },
                            );
                            return Ok(shared.snapshot());
                        }
                        Message::Register { extension_point_id } => {
                            warn!(
                                instance = %id,
                                plugin = %entry.id,
                                requested = %extension_point_id,
                                granted = %extension_point,
                                "register for ungranted extension point"
                            );
                            queue.enqueue(Message::Error {
                                reason: format!(
                                    "capability denied: extension point '{extension_point_id}' not granted"
                                ),
                            });
                            // Keep waiting: the plugin may re-register
                        }
                        other => stashed.push(other),
                    }
                }
                Ok(None) => {
                    drain_task.abort();
                    queue.close();
                    let e = HostError::SandboxLoad(format!(
                        "plugin '{}' exited before registering",
                        entry.id
                    ));
                    return Err(self.record_failed(shared, e).await);
                }
                Err(_) => {
                    sandbox_task.abort();
                    drain_task.abort();
                    queue.close();
                    let e = HostError::LoadTimeout(self.config.load_timeout_ms);
                    return Err(self.record_failed(shared, e).await);
                }
            }
        }
    }

    /// Mark an instance `Failed`, keep its record for introspection and
    /// navigation cleanup, and hand the error back.
    async fn record_failed(&self, shared: Arc<InstanceShared>, err: HostError) -> HostError {
        shared.transition(InstanceState::Failed);
        warn!(
            instance = %shared.id,
            plugin = %shared.manifest.id,
            error = %err,
            "sandbox failed to load"
        );
        let id = shared.id;
        self.instances
            .write()
            .await
            .insert(id, SandboxEntry { shared, runtime: None });
        err
    }

    /// Install the host-side handler and start this instance's reader
    /// task. Messages stashed during startup are replayed first.
    pub async fn on_message(
        &self,
        id: InstanceId,
        handler: Arc<dyn InboundHandler>,
    ) -> Result<(), HostError> {
        let mut instances = self.instances.write().await;
        let entry = instances
            .get_mut(&id)
            .ok_or_else(|| HostError::InstanceNotFound(id.to_string()))?;
        let Some(runtime) = entry.runtime.as_mut() else {
            return Err(HostError::InstanceNotFound(id.to_string()));
        };
        let Some(pending) = runtime.pending.take() else {
            warn!(instance = %id, "message handler already installed");
            return Ok(());
        };

        let task = spawn_reader(
            id,
            Arc::clone(&entry.shared),
            Arc::clone(&runtime.queue),
            runtime.shutdown.subscribe(),
            pending,
            handler,
            self.config.echo_protocol_errors,
        );
        runtime.reader_task = Some(task);
        Ok(())
    }

    /// Fire-and-forget delivery into the sandbox, FIFO per instance with
    /// snapshot coalescing. Sends to unknown or retired instances are
    /// dropped.
    pub async fn send(&self, id: InstanceId, message: Message) {
        let instances = self.instances.read().await;
        match instances.get(&id).and_then(|e| e.runtime.as_ref()) {
            Some(runtime) => {
                runtime.queue.enqueue(message);
            }
            None => debug!(instance = %id, kind = message.kind(), "send to retired instance dropped"),
        }
    }

    /// Tear one sandbox down.
    ///
    /// Order: the delivery queue closes first (no post-teardown delivery),
    /// the sandbox task is stopped (no new inbound), then frames the
    /// sandbox had already sent are flushed through the handler before the
    /// record disappears. Removing the instance's subscriptions from the
    /// bus is the orchestrator's first step before calling this.
    pub async fn destroy(&self, id: InstanceId) -> Result<(), HostError> {
        let (shared, runtime) = {
            let mut instances = self.instances.write().await;
            let entry = instances
                .get_mut(&id)
                .ok_or_else(|| HostError::InstanceNotFound(id.to_string()))?;
            (Arc::clone(&entry.shared), entry.runtime.take())
        };

        let Some(runtime) = runtime else {
            // Failed instance: nothing live to tear down
            shared.transition(InstanceState::Unmounted);
            self.instances.write().await.remove(&id);
            return Ok(());
        };

        runtime.queue.close();
        shared.transition(InstanceState::Unmounted);

        // Teardown is signalled before the abort can close the channel,
        // so the reader never classifies this as a crash
        let _ = runtime.shutdown.send(true);
        runtime.sandbox_task.abort();
        let _ = runtime.sandbox_task.await;
        if let Some(task) = runtime.reader_task {
            let _ = task.await;
        } else if let Some(mut pending) = runtime.pending {
            // Handler was never installed; nothing to dispatch to
            while let Ok(frame) = pending.rx.try_recv() {
                match decode_inbound(&frame, &mut pending.tracker) {
                    Ok(message) => {
                        debug!(instance = %id, kind = message.kind(), "unrouted frame discarded at teardown")
                    }
                    Err(e) => debug!(instance = %id, error = %e, "malformed frame at teardown"),
                }
            }
        }

        runtime.drain_task.abort();
        self.instances.write().await.remove(&id);
        info!(instance = %id, plugin = %shared.manifest.id, "instance destroyed");
        Ok(())
    }

    // ── Query surface ────────────────────────────────────────────────

    /// Live record of an instance, used by the message router.
    pub async fn shared(&self, id: InstanceId) -> Option<Arc<InstanceShared>> {
        self.instances
            .read()
            .await
            .get(&id)
            .map(|e| Arc::clone(&e.shared))
    }

    /// Delivery queue handle for bus subscription wiring.
    pub async fn queue_handle(&self, id: InstanceId) -> Option<Arc<DeliveryQueue>> {
        self.instances
            .read()
            .await
            .get(&id)
            .and_then(|e| e.runtime.as_ref())
            .map(|r| Arc::clone(&r.queue))
    }

    pub async fn instance(&self, id: InstanceId) -> Option<PluginInstance> {
        self.instances
            .read()
            .await
            .get(&id)
            .map(|e| e.shared.snapshot())
    }

    pub async fn instances(&self) -> Vec<PluginInstance> {
        self.instances
            .read()
            .await
            .values()
            .map(|e| e.shared.snapshot())
            .collect()
    }

    pub async fn ids(&self) -> Vec<InstanceId> {
        self.instances.read().await.keys().copied().collect()
    }
}

/// Reader task: decodes, seq-validates, and dispatches every inbound
/// frame of one sandbox. Runs until crash, teardown flush, or the host
/// drops the instance.
#[allow(clippy::too_many_arguments)]
fn spawn_reader(
    id: InstanceId,
    shared: Arc<InstanceShared>,
    queue: Arc<DeliveryQueue>,
    mut shutdown: watch::Receiver<bool>,
    pending: PendingReader,
    handler: Arc<dyn InboundHandler>,
    echo_protocol_errors: bool,
) -> JoinHandle<()> {
    let PendingReader {
        mut rx,
        mut tracker,
        stashed,
    } = pending;
    tokio::spawn(async move {
        for message in stashed {
            handler.on_message(id, message).await;
        }
        loop {
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(frame) => match decode_inbound(&frame, &mut tracker) {
                        Ok(message) => handler.on_message(id, message).await,
                        Err(e) => {
                            warn!(
                                instance = %id,
                                plugin = %shared.manifest.id,
                                error = %e,
                                "malformed inbound frame, dropped"
                            );
                            if echo_protocol_errors {
                                queue.enqueue(Message::Error {
                                    reason: format!("protocol error: {e}"),
                                });
                            }
                        }
                    },
                    None => {
                        if *shutdown.borrow() {
                            // Channel drained to the end during teardown
                            return;
                        }
                        warn!(
                            instance = %id,
                            plugin = %shared.manifest.id,
                            "sandbox channel closed unexpectedly"
                        );
                        handler.on_disconnect(id).await;
                        return;
                    }
                },
                _ = shutdown.changed() => {
                    // Teardown: dispatch frames the sandbox sent before
                    // the abort, then stop; nothing newer can exist
                    while let Ok(frame) = rx.try_recv() {
                        match decode_inbound(&frame, &mut tracker) {
                            Ok(message) => handler.on_message(id, message).await,
                            Err(e) => debug!(instance = %id, error = %e, "malformed frame in teardown flush"),
                        }
                    }
                    return;
                }
            }
        }
    })
}

// ─── Tests ──────────────────────────────────────────────────────────
