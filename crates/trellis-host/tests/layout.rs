//! Slot lifecycle and height negotiation through a real shell: debounced
//! application, fallback on failure, and cleanup on unmount.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use trellis_host::{InstanceState, StaticBundleLoader};
use trellis_plugin_api::{PluginApi, PluginApiError};

use common::{build_host, manifest_entry, settle, TestShell};

#[tokio::test(start_paused = true)]
async fn test_burst_of_height_reports_applies_once() {
    let loader = StaticBundleLoader::new();
    loader.register("https://plugins.example.com/notes.js", || {
        Box::new(|api: &PluginApi| {
            api.register("task-details", |_| {});
            // A render loop thrashing its height during mount
            for px in [40.0, 80.0, 95.0, 110.0, 120.0] {
                api.set_height(px);
            }
            Ok(())
        })
    });
    let shell = Arc::new(TestShell::default());
    let host = build_host(
        vec![manifest_entry("notes", "task-details", &[], &[])],
        loader,
        Arc::clone(&shell),
    );
    host.start(&["task-details"]).await;
    settle().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    settle().await;

    let region = shell.region_for("task-details");
    assert_eq!(region.height_applications(), vec!["height:120"]);
    assert_eq!(region.calls()[0], "placeholder");
    assert_eq!(host.instances().await[0].rendered_height, Some(120.0));
}

#[tokio::test(start_paused = true)]
async fn test_later_report_resizes_again() {
    let loader = StaticBundleLoader::new();
    loader.register("https://plugins.example.com/notes.js", || {
        Box::new(|api: &PluginApi| {
            api.register("task-details", |_| {});
            api.set_height(100.0);
            // Grows when content arrives
            let grower = api.clone();
            api.subscribe(&["metadata"], move |_| grower.set_height(260.0));
            Ok(())
        })
    });
    let shell = Arc::new(TestShell::default());
    let host = build_host(
        vec![manifest_entry("notes", "task-details", &["metadata"], &[])],
        loader,
        Arc::clone(&shell),
    );
    host.start(&["task-details"]).await;
    settle().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    host.publish("metadata", json!({ "rows": 12 })).await;
    settle().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    settle().await;

    let region = shell.region_for("task-details");
    assert_eq!(
        region.height_applications(),
        vec!["height:100", "height:260"]
    );
}

#[tokio::test]
async fn test_missing_bundle_falls_back() {
    let shell = Arc::new(TestShell::default());
    let host = build_host(
        vec![manifest_entry("ghost", "task-details", &[], &[])],
        StaticBundleLoader::new(),
        Arc::clone(&shell),
    );
    host.start(&["task-details"]).await;

    let region = shell.region_for("task-details");
    assert_eq!(region.calls(), vec!["placeholder", "fallback"]);
    assert_eq!(host.instances().await[0].state, InstanceState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_never_registering_bundle_times_out_to_fallback() {
    let loader = StaticBundleLoader::new();
    loader.register("https://plugins.example.com/lazy.js", || {
        Box::new(|_: &PluginApi| Ok::<(), PluginApiError>(()))
    });
    let shell = Arc::new(TestShell::default());
    let host = build_host(
        vec![manifest_entry("lazy", "task-details", &[], &[])],
        loader,
        Arc::clone(&shell),
    );
    host.start(&["task-details"]).await;

    let region = shell.region_for("task-details");
    assert_eq!(region.calls(), vec!["placeholder", "fallback"]);
    assert_eq!(host.instances().await[0].state, InstanceState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_unmount_clears_the_region() {
    let loader = StaticBundleLoader::new();
    loader.register("https://plugins.example.com/notes.js", || {
        Box::new(|api: &PluginApi| {
            api.register("task-details", |_| {});
            api.set_height(75.0);
            Ok(())
        })
    });
    let shell = Arc::new(TestShell::default());
    let host = build_host(
        vec![manifest_entry("notes", "task-details", &[], &[])],
        loader,
        Arc::clone(&shell),
    );
    host.start(&["task-details"]).await;
    settle().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let id = host.instances().await[0].id;
    host.destroy_instance(id).await.unwrap();

    let region = shell.region_for("task-details");
    let calls = region.calls();
    assert_eq!(calls.last().map(String::as_str), Some("clear"));
    assert!(calls.contains(&"height:75".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_navigation_reuses_nothing_across_pages() {
    let loader = StaticBundleLoader::new();
    loader.register("https://plugins.example.com/notes.js", || {
        Box::new(|api: &PluginApi| {
            api.register("task-details", |_| {});
            api.set_height(90.0);
            Ok(())
        })
    });
    let shell = Arc::new(TestShell::default());
    let host = build_host(
        vec![manifest_entry("notes", "task-details", &[], &[])],
        loader,
        Arc::clone(&shell),
    );
    host.start(&["task-details"]).await;
    settle().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Leave the page, come back: the old region is cleared and a fresh
    // one goes through the full placeholder/size cycle
    host.navigate(&[]).await;
    let first = shell.region_for("task-details");
    assert_eq!(first.calls().last().map(String::as_str), Some("clear"));

    host.navigate(&["task-details"]).await;
    settle().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    settle().await;

    let second = shell.region_for("task-details");
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.calls()[0], "placeholder");
    assert_eq!(second.height_applications(), vec!["height:90"]);
}
