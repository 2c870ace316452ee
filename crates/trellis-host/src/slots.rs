//! Slot rendering regions and layout negotiation.
//!
//! The host shell hands the layout one region handle per plugin slot; the
//! core never constructs page layout itself. Height reports from a plugin
//! drive a per-slot state machine `Reserved → Sized → Stable`, with
//! `Fallback` for failed instances. Applying a height is debounced on the
//! trailing edge: reports arriving within one window collapse into a
//! single layout pass using the last value, and a quiet window after an
//! apply promotes the slot to `Stable`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info};

use crate::instance::InstanceId;

/// A rendering region the host shell reserves for one plugin instance.
pub trait SlotRegion: Send + Sync {
    /// Neutral placeholder shown while the plugin loads.
    fn show_placeholder(&self);
    /// Resize the region to the given height in pixels.
    fn apply_height(&self, px: f64);
    /// Neutral fallback for a failed plugin; no error detail is leaked.
    fn show_fallback(&self);
    /// Empty the region on unmount.
    fn clear(&self);
}

/// Supplies a [`SlotRegion`] for every extension point present on the
/// current page. Implemented by the embedding shell.
pub trait SlotShell: Send + Sync {
    fn region(&self, extension_point: &str) -> Arc<dyn SlotRegion>;
}

/// No-op region for plugins mounted at non-visual extension points.
#[derive(Debug, Default)]
pub struct HeadlessRegion;

impl SlotRegion for HeadlessRegion {
    fn show_placeholder(&self) {}
    fn apply_height(&self, _px: f64) {}
    fn show_fallback(&self) {}
    fn clear(&self) {}
}

/// Shell with no visual surface at all; every region is headless. Used
/// by embedders that consume plugin data without rendering, and by tests.
#[derive(Debug, Default)]
pub struct HeadlessShell;

impl SlotShell for HeadlessShell {
    fn region(&self, _extension_point: &str) -> Arc<dyn SlotRegion> {
        Arc::new(HeadlessRegion)
    }
}

/// Layout state of one plugin slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Reserved,
    Sized,
    Stable,
    Fallback,
}

struct SlotEntry {
    region: Arc<dyn SlotRegion>,
    state: SlotState,
    pending: Option<f64>,
    applied: Option<f64>,
    /// Bumped on fail/release so an in-flight debounce timer can tell it
    /// is stale.
    epoch: u64,
    timer_running: bool,
}

/// Tracks every reserved slot and debounces height application.
pub struct SlotLayout {
    window: Duration,
    slots: Arc<Mutex<HashMap<InstanceId, SlotEntry>>>,
}

impl SlotLayout {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Reserve a region for a new instance and show its placeholder.
    pub fn reserve(&self, id: InstanceId, region: Arc<dyn SlotRegion>) {
        {
            let mut slots = self.slots.lock().unwrap();
            slots.insert(
                id,
                SlotEntry {
                    region: Arc::clone(&region),
                    state: SlotState::Reserved,
                    pending: None,
                    applied: None,
                    epoch: 0,
                    timer_running: false,
                },
            );
        }
        region.show_placeholder();
        debug!(instance = %id, "slot reserved");
    }

    /// Record a height report, feeding the debounce window. The last
    /// report within a window wins.
    pub fn report_height(&self, id: InstanceId, px: f64) {
        let mut slots = self.slots.lock().unwrap();
        let Some(entry) = slots.get_mut(&id) else {
            debug!(instance = %id, "height report for unknown slot, ignored");
            return;
        };
        if entry.state == SlotState::Fallback {
            debug!(instance = %id, "height report for failed slot, ignored");
            return;
        }
        entry.pending = Some(px);
        if !entry.timer_running {
            entry.timer_running = true;
            let epoch = entry.epoch;
            drop(slots);
            self.spawn_debounce_timer(id, epoch);
        }
    }

    /// One debounce pass per window while reports keep arriving, then one
    /// quiet window to promote the slot to `Stable`.
    fn spawn_debounce_timer(&self, id: InstanceId, epoch: u64) {
        let slots = Arc::clone(&self.slots);
        let window = self.window;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(window).await;
                let apply = {
                    let mut table = slots.lock().unwrap();
                    let Some(entry) = table.get_mut(&id) else {
                        return;
                    };
                    if entry.epoch != epoch {
                        return;
                    }
                    match entry.pending.take() {
                        Some(px) => {
                            entry.state = SlotState::Sized;
                            entry.applied = Some(px);
                            Some((Arc::clone(&entry.region), px))
                        }
                        None => {
                            if entry.state == SlotState::Sized {
                                entry.state = SlotState::Stable;
                            }
                            entry.timer_running = false;
                            None
                        }
                    }
                };
                match apply {
                    Some((region, px)) => {
                        region.apply_height(px);
                        debug!(instance = %id, height = px, "slot height applied");
                    }
                    None => return,
                }
            }
        });
    }

    /// Show the neutral fallback for a failed instance; any pending height
    /// report is discarded.
    pub fn fail(&self, id: InstanceId) {
        let region = {
            let mut slots = self.slots.lock().unwrap();
            let Some(entry) = slots.get_mut(&id) else {
                return;
            };
            entry.epoch += 1;
            entry.pending = None;
            entry.timer_running = false;
            entry.state = SlotState::Fallback;
            Arc::clone(&entry.region)
        };
        region.show_fallback();
        info!(instance = %id, "slot showing fallback");
    }

    /// Clear and forget a slot on unmount.
    pub fn release(&self, id: InstanceId) {
        let removed = self.slots.lock().unwrap().remove(&id);
        if let Some(entry) = removed {
            entry.region.clear();
            debug!(instance = %id, "slot released");
        }
    }

    // ── Query surface ────────────────────────────────────────────────

    pub fn state(&self, id: InstanceId) -> Option<SlotState> {
        self.slots.lock().unwrap().get(&id).map(|e| e.state)
    }

    pub fn applied_height(&self, id: InstanceId) -> Option<f64> {
        self.slots.lock().unwrap().get(&id).and_then(|e| e.applied)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Region that records every call for assertions.
    #[derive(Debug, Default)]
    struct RecordingRegion {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingRegion {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
        fn push(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }
    }

    impl SlotRegion for RecordingRegion {
        fn show_placeholder(&self) {
            self.push("placeholder");
        }
        fn apply_height(&self, px: f64) {
            self.push(format!("height:{px}"));
        }
        fn show_fallback(&self) {
            self.push("fallback");
        }
        fn clear(&self) {
            self.push("clear");
        }
    }

    fn layout() -> (SlotLayout, Arc<RecordingRegion>, InstanceId) {
        let layout = SlotLayout::new(Duration::from_millis(25));
        let region = Arc::new(RecordingRegion::default());
        let id = InstanceId::new();
        layout.reserve(id, region.clone());
        (layout, region, id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserve_shows_placeholder() {
        let (layout, region, id) = layout();
        assert_eq!(region.calls(), vec!["placeholder"]);
        assert_eq!(layout.state(id), Some(SlotState::Reserved));
        assert_eq!(layout.applied_height(id), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_reports_coalesce_to_one_pass() {
        let (layout, region, id) = layout();

        // 5 reports inside a 10 ms burst, window is 25 ms
        for px in [10.0, 20.0, 30.0, 40.0, 120.0] {
            layout.report_height(id, px);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(region.calls(), vec!["placeholder", "height:120"]);
        assert_eq!(layout.state(id), Some(SlotState::Sized));
        assert_eq!(layout.applied_height(id), Some(120.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_window_promotes_to_stable() {
        let (layout, _region, id) = layout();
        layout.report_height(id, 80.0);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(layout.state(id), Some(SlotState::Sized));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(layout.state(id), Some(SlotState::Stable));
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_during_quiet_window_reapplies() {
        let (layout, region, id) = layout();
        layout.report_height(id, 80.0);
        tokio::time::sleep(Duration::from_millis(30)).await;

        // New report before the quiet window elapses
        layout.report_height(id, 95.0);
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(region.calls(), vec!["placeholder", "height:80", "height:95"]);
        assert_eq!(layout.applied_height(id), Some(95.0));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(layout.state(id), Some(SlotState::Stable));
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_report_overwrites_height() {
        let (layout, _region, id) = layout();
        layout.report_height(id, 80.0);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(layout.state(id), Some(SlotState::Stable));

        // A stable slot re-enters Sized on the next report
        layout.report_height(id, 200.0);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(layout.state(id), Some(SlotState::Sized));
        assert_eq!(layout.applied_height(id), Some(200.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_discards_pending_report() {
        let (layout, region, id) = layout();
        layout.report_height(id, 80.0);
        layout.fail(id);
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(region.calls(), vec!["placeholder", "fallback"]);
        assert_eq!(layout.state(id), Some(SlotState::Fallback));
        assert_eq!(layout.applied_height(id), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_after_fail_is_ignored() {
        let (layout, region, id) = layout();
        layout.fail(id);
        layout.report_height(id, 80.0);
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(region.calls(), vec!["placeholder", "fallback"]);
        assert_eq!(layout.state(id), Some(SlotState::Fallback));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_clears_region_and_entry() {
        let (layout, region, id) = layout();
        layout.report_height(id, 80.0);
        layout.release(id);
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(region.calls(), vec!["placeholder", "clear"]);
        assert_eq!(layout.state(id), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_for_unknown_slot_is_ignored() {
        let layout = SlotLayout::new(Duration::from_millis(25));
        // Must not panic or spawn anything that applies
        layout.report_height(InstanceId::new(), 80.0);
        tokio::time::sleep(Duration::from_millis(60)).await;
    }

    #[test]
    fn test_headless_region_is_noop() {
        let region = HeadlessRegion;
        region.show_placeholder();
        region.apply_height(10.0);
        region.show_fallback();
        region.clear();
    }
}
