//! Plugin instance identity, lifecycle state, and the live record.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::manifest::PluginManifestEntry;

/// Identifier of one live plugin mounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(Uuid);

impl InstanceId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a plugin instance.
///
/// `Loading → Mounted → Active → Unmounted`, with `Failed` reachable from
/// any non-terminal state. `Failed → Unmounted` is also legal so that
/// navigation can retire a failed instance; `Unmounted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Loading,
    Mounted,
    Active,
    Failed,
    Unmounted,
}

impl InstanceState {
    pub fn is_terminal(self) -> bool {
        matches!(self, InstanceState::Unmounted)
    }

    /// Whether `self → next` is a legal lifecycle transition.
    pub fn can_transition_to(self, next: InstanceState) -> bool {
        use InstanceState::*;
        match (self, next) {
            (Loading, Mounted) => true,
            (Mounted, Active) => true,
            (Loading | Mounted | Active, Failed) => true,
            (Loading | Mounted | Active | Failed, Unmounted) => true,
            _ => false,
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceState::Loading => "loading",
            InstanceState::Mounted => "mounted",
            InstanceState::Active => "active",
            InstanceState::Failed => "failed",
            InstanceState::Unmounted => "unmounted",
        };
        f.write_str(s)
    }
}

/// Live record of one plugin instance, owned by the sandbox host table.
///
/// The mutable fields only change in response to messages from that same
/// instance (or its teardown), so there is no cross-instance contention on
/// these locks.
#[derive(Debug)]
pub struct InstanceShared {
    pub id: InstanceId,
    pub manifest: Arc<PluginManifestEntry>,
    pub extension_point: String,
    pub created_at: DateTime<Utc>,
    state: Mutex<InstanceState>,
    subscriptions: Mutex<HashSet<String>>,
    rendered_height: Mutex<Option<f64>>,
}

impl InstanceShared {
    pub fn new(
        id: InstanceId,
        manifest: Arc<PluginManifestEntry>,
        extension_point: impl Into<String>,
    ) -> Self {
        Self {
            id,
            manifest,
            extension_point: extension_point.into(),
            created_at: Utc::now(),
            state: Mutex::new(InstanceState::Loading),
            subscriptions: Mutex::new(HashSet::new()),
            rendered_height: Mutex::new(None),
        }
    }

    pub fn state(&self) -> InstanceState {
        *self.state.lock().unwrap()
    }

    /// Apply a lifecycle transition. Illegal transitions are refused and
    /// logged rather than applied.
    pub fn transition(&self, next: InstanceState) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.can_transition_to(next) {
            *state = next;
            true
        } else {
            warn!(
                instance = %self.id,
                plugin = %self.manifest.id,
                from = %*state,
                to = %next,
                "illegal instance state transition refused"
            );
            false
        }
    }

    pub fn add_subscriptions(&self, topics: &[String]) {
        let mut subs = self.subscriptions.lock().unwrap();
        for topic in topics {
            subs.insert(topic.clone());
        }
    }

    pub fn remove_subscriptions(&self, topics: &[String]) {
        let mut subs = self.subscriptions.lock().unwrap();
        for topic in topics {
            subs.remove(topic);
        }
    }

    pub fn subscriptions(&self) -> HashSet<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn set_rendered_height(&self, px: f64) {
        *self.rendered_height.lock().unwrap() = Some(px);
    }

    pub fn rendered_height(&self) -> Option<f64> {
        *self.rendered_height.lock().unwrap()
    }

    /// Point-in-time public snapshot of this record.
    pub fn snapshot(&self) -> PluginInstance {
        let mut subscriptions: Vec<String> =
            self.subscriptions.lock().unwrap().iter().cloned().collect();
        subscriptions.sort();
        PluginInstance {
            id: self.id,
            manifest_id: self.manifest.id.clone(),
            extension_point: self.extension_point.clone(),
            subscriptions,
            rendered_height: self.rendered_height(),
            state: self.state(),
            created_at: self.created_at,
        }
    }
}

/// Public snapshot of a plugin instance, for introspection surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInstance {
    pub id: InstanceId,
    pub manifest_id: String,
    pub extension_point: String,
    pub subscriptions: Vec<String>,
    pub rendered_height: Option<f64>,
    pub state: InstanceState,
    pub created_at: DateTime<Utc>,
}

// ─── Tests ───────────────────────────────────────────────────────────
