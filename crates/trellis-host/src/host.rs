//! Host orchestrator.
//!
//! [`PluginHost`] ties the pieces together: the registry says which
//! plugins exist and what they may do, the sandbox host runs them, the
//! topic bus moves their data, and the slot layout keeps the page calm
//! while they size themselves. Navigation is reconciliation: given the
//! extension points present on the new page, instances whose points left
//! are destroyed and new points are activated.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use trellis_protocol::Message;

use crate::bus::TopicBus;
use crate::config::HostConfig;
use crate::error::HostError;
use crate::instance::{InstanceId, InstanceState, PluginInstance};
use crate::registry::PluginRegistry;
use crate::sandbox::{BundleLoader, InboundHandler, SandboxHost};
use crate::slots::{SlotLayout, SlotShell};

// ─── Inbound routing ────────────────────────────────────────────────

/// Routes sandbox traffic into the bus and layout, enforcing manifest
/// capabilities. One router serves all instances; it runs on each
/// instance's reader task.
struct Router {
    bus: Arc<TopicBus>,
    sandboxes: Arc<SandboxHost>,
    slots: Arc<SlotLayout>,
}

#[async_trait]
impl InboundHandler for Router {
    async fn on_message(&self, id: InstanceId, message: Message) {
        let Some(shared) = self.sandboxes.shared(id).await else {
            debug!(instance = %id, kind = message.kind(), "message from unknown instance dropped");
            return;
        };
        match message {
            Message::Subscribe { topics } => {
                if shared.state() == InstanceState::Unmounted {
                    debug!(instance = %id, "subscribe from retired instance ignored");
                    return;
                }
                let (granted, denied): (Vec<String>, Vec<String>) = topics
                    .into_iter()
                    .partition(|t| shared.manifest.may_subscribe(t));
                if !denied.is_empty() {
                    warn!(
                        instance = %id,
                        plugin = %shared.manifest.id,
                        topics = ?denied,
                        "subscribe denied by manifest"
                    );
                    self.sandboxes
                        .send(
                            id,
                            Message::Error {
                                reason: format!(
                                    "capability denied: subscribe to {denied:?} not granted"
                                ),
                            },
                        )
                        .await;
                }
                if !granted.is_empty() {
                    if let Some(queue) = self.sandboxes.queue_handle(id).await {
                        self.bus.subscribe(id, &queue, &granted).await;
                        shared.add_subscriptions(&granted);
                    }
                }
            }
            Message::Unsubscribe { topics } => {
                self.bus.unsubscribe(id, &topics).await;
                shared.remove_subscriptions(&topics);
            }
            Message::DataEvent { topic, payload } => {
                if shared.manifest.may_publish(&topic) {
                    self.bus.publish(&topic, payload).await;
                } else {
                    warn!(
                        instance = %id,
                        plugin = %shared.manifest.id,
                        topic = %topic,
                        "publish denied by manifest"
                    );
                    self.sandboxes
                        .send(
                            id,
                            Message::Error {
                                reason: format!(
                                    "capability denied: publish to '{topic}' not granted"
                                ),
                            },
                        )
                        .await;
                }
            }
            Message::SetHeight { height_px } => {
                if shared.state() == InstanceState::Unmounted {
                    debug!(instance = %id, "height report from retired instance ignored");
                    return;
                }
                shared.set_rendered_height(height_px);
                self.slots.report_height(id, height_px);
            }
            Message::Register { extension_point_id } => {
                warn!(
                    instance = %id,
                    plugin = %shared.manifest.id,
                    requested = %extension_point_id,
                    "register after mount rejected"
                );
                self.sandboxes
                    .send(
                        id,
                        Message::Error {
                            reason: format!(
                                "protocol error: already mounted at '{}'",
                                shared.extension_point
                            ),
                        },
                    )
                    .await;
            }
            Message::Error { reason } => {
                warn!(
                    instance = %id,
                    plugin = %shared.manifest.id,
                    reason = %reason,
                    "plugin reported error"
                );
            }
        }
    }

    async fn on_disconnect(&self, id: InstanceId) {
        // Sandbox crash: retire the plugin's presence, show the fallback,
        // leave everything else running
        if let Some(shared) = self.sandboxes.shared(id).await {
            shared.transition(InstanceState::Failed);
        }
        self.bus.remove_instance(id).await;
        self.slots.fail(id);
    }
}

// ─── Host ───────────────────────────────────────────────────────────

pub struct PluginHost {
    config: HostConfig,
    registry: Arc<PluginRegistry>,
    bus: Arc<TopicBus>,
    sandboxes: Arc<SandboxHost>,
    slots: Arc<SlotLayout>,
    shell: Arc<dyn SlotShell>,
    router: Arc<Router>,
    /// Which extension point each live (or failed-but-unretired) instance
    /// belongs to, for navigation reconciliation.
    assignments: RwLock<HashMap<InstanceId, String>>,
    active_points: RwLock<Vec<String>>,
}

impl PluginHost {
    pub fn new(
        config: HostConfig,
        registry: PluginRegistry,
        loader: Arc<dyn BundleLoader>,
        shell: Arc<dyn SlotShell>,
    ) -> Self {
        let bus = Arc::new(TopicBus::new());
        let sandboxes = Arc::new(SandboxHost::new(config.clone(), loader));
        let slots = Arc::new(SlotLayout::new(config.layout_debounce()));
        let router = Arc::new(Router {
            bus: Arc::clone(&bus),
            sandboxes: Arc::clone(&sandboxes),
            slots: Arc::clone(&slots),
        });
        Self {
            config,
            registry: Arc::new(registry),
            bus,
            sandboxes,
            slots,
            shell,
            router,
            assignments: RwLock::new(HashMap::new()),
            active_points: RwLock::new(Vec::new()),
        }
    }

    /// Activate every plugin registered for the given extension points.
    pub async fn start(&self, extension_points: &[&str]) {
        info!(points = ?extension_points, "host starting");
        for point in extension_points {
            self.activate_point(point).await;
        }
        *self.active_points.write().await =
            extension_points.iter().map(|p| (*p).to_string()).collect();
    }

    /// Reconcile the running set against a new page's extension points:
    /// instances at points no longer present are destroyed (failed
    /// records included), points not yet active are activated.
    pub async fn navigate(&self, extension_points: &[&str]) {
        let desired: Vec<String> = extension_points.iter().map(|p| (*p).to_string()).collect();
        info!(points = ?desired, "navigating");

        let stale: Vec<InstanceId> = self
            .assignments
            .read()
            .await
            .iter()
            .filter(|(_, point)| !desired.contains(point))
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            if let Err(e) = self.destroy_instance(id).await {
                warn!(instance = %id, error = %e, "failed to retire instance during navigation");
            }
        }

        let current = self.active_points.read().await.clone();
        for point in &desired {
            if !current.contains(point) {
                self.activate_point(point).await;
            }
        }
        *self.active_points.write().await = desired;
    }

    /// Spin up one sandbox per registered plugin of `extension_point`, in
    /// manifest order. A plugin that fails to load gets its fallback and
    /// a `Failed` record; the others proceed.
    async fn activate_point(&self, extension_point: &str) {
        for entry in self.registry.resolve(extension_point) {
            let id = InstanceId::new();
            self.slots.reserve(id, self.shell.region(extension_point));
            self.assignments
                .write()
                .await
                .insert(id, extension_point.to_string());

            match self
                .sandboxes
                .create(id, Arc::clone(&entry), extension_point)
                .await
            {
                Ok(_) => {
                    let handler: Arc<dyn InboundHandler> = self.router.clone();
                    if let Err(e) = self.sandboxes.on_message(id, handler).await {
                        warn!(instance = %id, error = %e, "failed to install message handler");
                        continue;
                    }
                    if let Some(shared) = self.sandboxes.shared(id).await {
                        shared.transition(InstanceState::Active);
                    }
                    info!(
                        instance = %id,
                        plugin = %entry.id,
                        extension_point = %extension_point,
                        "instance active"
                    );
                }
                Err(e) => {
                    // Sandbox host already recorded the failure; the slot
                    // shows its fallback and the record stays visible
                    // until navigation retires it
                    warn!(
                        instance = %id,
                        plugin = %entry.id,
                        error = %e,
                        "plugin failed to activate"
                    );
                    self.slots.fail(id);
                }
            }
        }
    }

    /// Tear one instance down completely. Subscriptions go first so no
    /// delivery races the teardown, then the sandbox, then the slot.
    pub async fn destroy_instance(&self, id: InstanceId) -> Result<(), HostError> {
        self.bus.remove_instance(id).await;
        let result = self.sandboxes.destroy(id).await;
        self.slots.release(id);
        self.assignments.write().await.remove(&id);
        result
    }

    /// Destroy every instance and forget the active points.
    pub async fn shutdown(&self) {
        info!("host shutting down");
        let ids: Vec<InstanceId> = self.assignments.read().await.keys().copied().collect();
        for id in ids {
            if let Err(e) = self.destroy_instance(id).await {
                warn!(instance = %id, error = %e, "failed to destroy instance at shutdown");
            }
        }
        self.active_points.write().await.clear();
    }

    /// Host-origin publish into a topic. The host's own producers are not
    /// subject to manifest grants.
    pub async fn publish(&self, topic: &str, payload: serde_json::Value) {
        self.bus.publish(topic, payload).await;
    }

    // ── Introspection ────────────────────────────────────────────────

    pub async fn instances(&self) -> Vec<PluginInstance> {
        self.sandboxes.instances().await
    }

    pub async fn instance(&self, id: InstanceId) -> Option<PluginInstance> {
        self.sandboxes.instance(id).await
    }

    pub async fn active_count(&self) -> usize {
        self.sandboxes
            .instances()
            .await
            .iter()
            .filter(|i| i.state == InstanceState::Active)
            .count()
    }

    pub async fn active_points(&self) -> Vec<String> {
        self.active_points.read().await.clone()
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<TopicBus> {
        &self.bus
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
