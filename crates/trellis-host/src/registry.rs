//! Plugin registry — the validated, ordered table of installable plugins.
//!
//! Built once at startup from the manifest and immutable afterwards.
//! Resolution preserves manifest order, which makes mount order
//! deterministic when several plugins share an extension point.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::HostError;
use crate::manifest::{PluginManifest, PluginManifestEntry};

#[derive(Debug, Default)]
pub struct PluginRegistry {
    /// Entries in manifest order.
    entries: Vec<Arc<PluginManifestEntry>>,
    /// id → index into `entries`.
    by_id: HashMap<String, usize>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and insert one entry.
    ///
    /// This is the strict contract: a malformed entry or a duplicate id
    /// fails with [`HostError::Manifest`] and leaves the registry
    /// unchanged.
    pub fn insert(&mut self, entry: PluginManifestEntry) -> Result<(), HostError> {
        entry.validate()?;
        if self.by_id.contains_key(&entry.id) {
            return Err(HostError::Manifest(format!(
                "duplicate plugin id '{}'",
                entry.id
            )));
        }
        self.by_id.insert(entry.id.clone(), self.entries.len());
        self.entries.push(Arc::new(entry));
        Ok(())
    }

    /// Build a registry from a parsed manifest, the lenient startup path:
    /// each entry that fails validation or duplicates an id is excluded
    /// and logged, and the others proceed.
    pub fn from_manifest(manifest: PluginManifest) -> Self {
        let mut registry = Self::new();
        for entry in manifest.plugins {
            let id = entry.id.clone();
            match registry.insert(entry) {
                Ok(()) => info!(plugin = %id, "plugin registered"),
                Err(e) => warn!(plugin = %id, error = %e, "plugin excluded from registry"),
            }
        }
        registry
    }

    /// All plugins declaring `extension_point`, in manifest order.
    pub fn resolve(&self, extension_point: &str) -> Vec<Arc<PluginManifestEntry>> {
        self.entries
            .iter()
            .filter(|e| e.extension_points.iter().any(|p| p == extension_point))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Arc<PluginManifestEntry>> {
        self.by_id.get(id).map(|&i| self.entries[i].clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &Arc<PluginManifestEntry>> {
        self.entries.iter()
    }

    /// Distinct extension points any registered plugin declares, in
    /// manifest order.
    pub fn extension_points(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for entry in &self.entries {
            for point in &entry.extension_points {
                if !seen.contains(point) {
                    seen.push(point.clone());
                }
            }
        }
        seen
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
