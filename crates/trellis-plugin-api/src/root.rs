//! The sandbox-local surface a plugin renders into.

use std::sync::{Arc, Mutex};

/// Rendering root owned by one sandbox.
///
/// The host never reads this surface; layout information only crosses the
/// boundary through `SetHeight` messages. It exists so a plugin has
/// somewhere to render and so `set_height(None)` can measure an intrinsic
/// size, the way a plugin would measure its own document.
#[derive(Debug, Clone, Default)]
pub struct RenderRoot {
    inner: Arc<Mutex<RootState>>,
}

#[derive(Debug, Default)]
struct RootState {
    content: String,
    natural_height: f64,
}

impl RenderRoot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the rendered content wholesale.
    pub fn set_content(&self, content: impl Into<String>) {
        self.inner.lock().unwrap().content = content.into();
    }

    pub fn content(&self) -> String {
        self.inner.lock().unwrap().content.clone()
    }

    /// Record the intrinsic height of the rendered content in pixels.
    pub fn set_natural_height(&self, px: f64) {
        self.inner.lock().unwrap().natural_height = px;
    }

    /// Intrinsic height of the rendered content; 0.0 before anything rendered.
    pub fn natural_height(&self) -> f64 {
        self.inner.lock().unwrap().natural_height
    }
}
