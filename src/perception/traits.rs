use async_trait::async_trait;

use crate::errors::GrabResult;
use crate::perception::types::{Detection, Frame, WindowHandle, WindowRect};

/// Access to the target window: lookup, geometry, pixels, z-order.
///
/// Every query is best-effort. `None` means "unavailable right now" and is
/// never fatal for the caller.
#[async_trait]
pub trait WindowSource: Send + Sync {
    /// First visible window whose title contains `title_substring`.
    async fn find(&self, title_substring: &str) -> Option<WindowHandle>;

    /// Topmost visible window containing the absolute point.
    async fn find_at(&self, _x: i32, _y: i32) -> Option<WindowHandle> {
        None
    }

    async fn rect(&self, handle: &WindowHandle) -> Option<WindowRect>;

    /// Pixels of the window. Zero or negative size is reported as `None`.
    async fn capture(&self, handle: &WindowHandle) -> Option<Frame>;

    async fn raise(&self, handle: &WindowHandle);

    async fn pin(&self, handle: &WindowHandle, on_top: bool);
}

/// Turns a frame into labelled, scored boxes.
///
/// Must be a pure function of its inputs and return an empty list when
/// nothing clears `confidence_threshold`.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, frame: &Frame, confidence_threshold: f32) -> GrabResult<Vec<Detection>>;

    /// Whether a model is actually loaded.
    fn is_loaded(&self) -> bool {
        true
    }
}
