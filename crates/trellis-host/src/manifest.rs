//! Plugin manifest parsing and validation.
//!
//! The manifest is a TOML document with repeated `[[plugin]]` tables, one
//! per installable plugin, loaded once at host startup and immutable for
//! the session.

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::HostError;

/// The whole manifest document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginManifest {
    #[serde(default, rename = "plugin")]
    pub plugins: Vec<PluginManifestEntry>,
}

/// Identity and capabilities of one installable plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifestEntry {
    /// Unique id, stable across plugin versions.
    pub id: String,
    /// Absolute URL of the plugin bundle.
    pub entry_url: String,
    /// Named mount locations the plugin can fill, in manifest order.
    pub extension_points: Vec<String>,
    /// Topics the plugin may subscribe to. Empty means unrestricted.
    #[serde(default)]
    pub subscribe_topics: Vec<String>,
    /// Topics the plugin may publish to. Empty means publishing denied.
    #[serde(default)]
    pub publish_topics: Vec<String>,
}

// ─── Validation helpers ─────────────────────────────────────────────

/// Validate a plugin id against `^[a-z][a-z0-9-]{1,63}$`.
fn validate_plugin_id(id: &str) -> Result<(), HostError> {
    let len = id.len();
    if !(2..=64).contains(&len) {
        return Err(HostError::Manifest(format!(
            "plugin id must be 2-64 characters, got {len}"
        )));
    }

    let mut chars = id.chars();

    // First character must be a lowercase ASCII letter
    if let Some(first) = chars.next() {
        if !first.is_ascii_lowercase() {
            return Err(HostError::Manifest(format!(
                "plugin id must start with a lowercase letter, got '{first}'"
            )));
        }
    }

    for ch in chars {
        if !ch.is_ascii_lowercase() && !ch.is_ascii_digit() && ch != '-' {
            return Err(HostError::Manifest(format!(
                "plugin id contains invalid character '{ch}'"
            )));
        }
    }

    Ok(())
}

/// Validate that `entry_url` parses as an absolute URL. Scheme policy is
/// the bundle loader's concern, not the manifest's.
fn validate_entry_url(value: &str) -> Result<(), HostError> {
    Url::parse(value).map_err(|e| {
        HostError::Manifest(format!("entry_url is not an absolute URL: '{value}' ({e})"))
    })?;
    Ok(())
}

fn validate_topic_list(topics: &[String], field_name: &str) -> Result<(), HostError> {
    for topic in topics {
        if topic.is_empty() {
            return Err(HostError::Manifest(format!(
                "{field_name} must not contain empty topic names"
            )));
        }
    }
    Ok(())
}

impl PluginManifestEntry {
    /// Validate all fields of a parsed entry.
    pub fn validate(&self) -> Result<(), HostError> {
        validate_plugin_id(&self.id)?;
        validate_entry_url(&self.entry_url)?;

        if self.extension_points.is_empty() {
            return Err(HostError::Manifest(format!(
                "plugin '{}' declares no extension points",
                self.id
            )));
        }
        for point in &self.extension_points {
            if point.is_empty() {
                return Err(HostError::Manifest(format!(
                    "plugin '{}' declares an empty extension point name",
                    self.id
                )));
            }
        }

        validate_topic_list(&self.subscribe_topics, "subscribe_topics")?;
        validate_topic_list(&self.publish_topics, "publish_topics")?;

        Ok(())
    }

    /// Whether this entry may subscribe to `topic`.
    ///
    /// An empty grant list is the manifest opting out of read access
    /// control entirely.
    pub fn may_subscribe(&self, topic: &str) -> bool {
        self.subscribe_topics.is_empty() || self.subscribe_topics.iter().any(|t| t == topic)
    }

    /// Whether this entry may publish to `topic`. Writes are opt-in.
    pub fn may_publish(&self, topic: &str) -> bool {
        self.publish_topics.iter().any(|t| t == topic)
    }
}

impl PluginManifest {
    /// Parse a manifest from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, HostError> {
        let manifest: PluginManifest = toml::from_str(toml_str)?;
        Ok(manifest)
    }

    /// Read and parse a manifest file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, HostError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
