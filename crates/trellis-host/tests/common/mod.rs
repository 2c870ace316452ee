// Shared test utilities for integration tests
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use serde_json::Value;

use trellis_host::slots::{SlotRegion, SlotShell};
use trellis_host::{HostConfig, PluginHost, PluginManifestEntry, PluginRegistry, StaticBundleLoader};
use trellis_plugin_api::PluginApi;

/// Region recording every shell call as a readable string, e.g.
/// "placeholder", "height:120", "fallback", "clear".
#[derive(Default)]
pub struct RecordingRegion {
    pub calls: Mutex<Vec<String>>,
}

impl RecordingRegion {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn height_applications(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with("height:"))
            .collect()
    }
}

impl SlotRegion for RecordingRegion {
    fn show_placeholder(&self) {
        self.calls.lock().unwrap().push("placeholder".into());
    }
    fn apply_height(&self, px: f64) {
        self.calls.lock().unwrap().push(format!("height:{px}"));
    }
    fn show_fallback(&self) {
        self.calls.lock().unwrap().push("fallback".into());
    }
    fn clear(&self) {
        self.calls.lock().unwrap().push("clear".into());
    }
}

/// Shell that hands out one recording region per reservation and keeps
/// them all for assertions.
#[derive(Default)]
pub struct TestShell {
    pub regions: Mutex<Vec<(String, Arc<RecordingRegion>)>>,
}

impl TestShell {
    /// Most recent region reserved for the given extension point.
    pub fn region_for(&self, extension_point: &str) -> Arc<RecordingRegion> {
        self.regions
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(point, _)| point == extension_point)
            .map(|(_, region)| Arc::clone(region))
            .expect("no region reserved for extension point")
    }
}

impl SlotShell for TestShell {
    fn region(&self, extension_point: &str) -> Arc<dyn SlotRegion> {
        let region = Arc::new(RecordingRegion::default());
        self.regions
            .lock()
            .unwrap()
            .push((extension_point.to_string(), Arc::clone(&region)));
        region
    }
}

pub fn manifest_entry(
    id: &str,
    point: &str,
    subscribe: &[&str],
    publish: &[&str],
) -> PluginManifestEntry {
    PluginManifestEntry {
        id: id.into(),
        entry_url: format!("https://plugins.example.com/{id}.js"),
        extension_points: vec![point.into()],
        subscribe_topics: subscribe.iter().map(|t| (*t).to_string()).collect(),
        publish_topics: publish.iter().map(|t| (*t).to_string()).collect(),
    }
}

/// Everything a subscription callback saw, as (topic, payload) pairs.
pub type Sink = Arc<Mutex<Vec<(String, Value)>>>;

/// Register a bundle that mounts at `point` and collects every delivery
/// on `topics` into the returned sink.
pub fn collecting_bundle(
    loader: &StaticBundleLoader,
    entry_url: &str,
    point: &str,
    topics: &[&str],
) -> Sink {
    let sink: Sink = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&sink);
    let point = point.to_string();
    let topics: Vec<String> = topics.iter().map(|t| (*t).to_string()).collect();
    loader.register(entry_url, move || {
        let sink = Arc::clone(&captured);
        let point = point.clone();
        let topics = topics.clone();
        Box::new(move |api: &PluginApi| {
            api.register(&point, |_| {});
            let sink = Arc::clone(&sink);
            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            api.subscribe(&topic_refs, move |event| {
                sink.lock()
                    .unwrap()
                    .push((event.topic.clone(), event.data.clone()));
            });
            Ok(())
        })
    });
    sink
}

pub fn build_host(
    entries: Vec<PluginManifestEntry>,
    loader: StaticBundleLoader,
    shell: Arc<TestShell>,
) -> PluginHost {
    let mut registry = PluginRegistry::new();
    for entry in entries {
        registry.insert(entry).expect("valid manifest entry");
    }
    PluginHost::new(HostConfig::default(), registry, Arc::new(loader), shell)
}

/// Let spawned sandbox, drain, and reader tasks make progress.
pub async fn settle() {
    for _ in 0..40 {
        tokio::task::yield_now().await;
    }
}
