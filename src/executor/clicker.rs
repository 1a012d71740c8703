use std::sync::Arc;
use std::time::Duration;

use crate::executor::input::ClickEmitter;
use crate::perception::traits::WindowSource;
use crate::perception::types::{BBox, WindowHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    Clicked { x: i32, y: i32 },
    /// Both mechanisms failed at this absolute point.
    Failed { x: i32, y: i32 },
    /// No window rectangle, fresh or cached.
    Unlocated,
    /// Acting was paused or disabled when the click came due.
    Suppressed,
}

impl ClickOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ClickOutcome::Clicked { .. })
    }

    pub fn point(&self) -> Option<(i32, i32)> {
        match *self {
            ClickOutcome::Clicked { x, y } | ClickOutcome::Failed { x, y } => Some((x, y)),
            _ => None,
        }
    }
}

/// Asked right before each emission. `false` suppresses the click.
pub type ClickGate<'a> = &'a (dyn Fn() -> bool + Send + Sync);

/// Clicks box centres, translated to screen space from a freshly fetched
/// window rectangle.
pub struct Clicker {
    window: Arc<dyn WindowSource>,
    primary: Arc<dyn ClickEmitter>,
    fallback: Arc<dyn ClickEmitter>,
    post_click: Duration,
}

impl Clicker {
    pub fn new(
        window: Arc<dyn WindowSource>,
        primary: Arc<dyn ClickEmitter>,
        fallback: Arc<dyn ClickEmitter>,
        post_click: Duration,
    ) -> Self {
        Self {
            window,
            primary,
            fallback,
            post_click,
        }
    }

    pub async fn click_center(&self, handle: &WindowHandle, bbox: &BBox, gate: ClickGate<'_>) -> ClickOutcome {
        self.click_center_settled(handle, bbox, self.post_click, gate).await
    }

    /// Same as `click_center`, with an explicit pause after the click.
    pub async fn click_center_settled(
        &self,
        handle: &WindowHandle,
        bbox: &BBox,
        settle: Duration,
        gate: ClickGate<'_>,
    ) -> ClickOutcome {
        let rect = match self.window.rect(handle).await.or(handle.rect) {
            Some(rect) => rect,
            None => {
                tracing::warn!(title = %handle.title, "no window rectangle, click skipped");
                return ClickOutcome::Unlocated;
            }
        };
        let (cx, cy) = bbox.center();
        let (x, y) = rect.to_absolute(cx, cy);

        // The rect refresh may have taken a while; the mode can have moved on.
        if !gate() {
            tracing::info!(x, y, "click suppressed before emission");
            return ClickOutcome::Suppressed;
        }
        let outcome = match self.primary.emit_click(x, y).await {
            Ok(()) => ClickOutcome::Clicked { x, y },
            Err(e) => {
                if !gate() {
                    tracing::info!(x, y, error = %e, "primary click failed, fallback suppressed");
                    return ClickOutcome::Suppressed;
                }
                tracing::warn!(x, y, mechanism = self.primary.name(), error = %e, "primary click failed, trying fallback");
                match self.fallback.emit_click(x, y).await {
                    Ok(()) => ClickOutcome::Clicked { x, y },
                    Err(e) => {
                        tracing::error!(x, y, mechanism = self.fallback.name(), error = %e, "click failed");
                        ClickOutcome::Failed { x, y }
                    }
                }
            }
        };
        tokio::time::sleep(settle).await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::perception::types::WindowRect;
    use crate::test_support::{FakeWindow, RecordingEmitter};

    fn open() -> bool {
        true
    }

    fn clicker(window: Arc<FakeWindow>, primary: Arc<RecordingEmitter>, fallback: Arc<RecordingEmitter>) -> Clicker {
        Clicker::new(window, primary, fallback, Duration::from_millis(20))
    }

    #[tokio::test(start_paused = true)]
    async fn center_is_translated_by_fresh_rect() {
        let window = Arc::new(FakeWindow::new());
        let primary = Arc::new(RecordingEmitter::new());
        let fallback = Arc::new(RecordingEmitter::new());
        let c = clicker(window.clone(), primary.clone(), fallback.clone());

        let handle = window.handle();
        window.set_rect(WindowRect::new(300, 400, 800, 900));
        let outcome = c.click_center(&handle, &BBox::new(10, 10, 50, 50), &open).await;

        assert_eq!(outcome, ClickOutcome::Clicked { x: 330, y: 430 });
        assert_eq!(primary.points(), vec![(330, 430)]);
        assert!(fallback.points().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_used_when_primary_fails() {
        let window = Arc::new(FakeWindow::new());
        let primary = Arc::new(RecordingEmitter::failing());
        let fallback = Arc::new(RecordingEmitter::new());
        let c = clicker(window.clone(), primary.clone(), fallback.clone());

        let outcome = c.click_center(&window.handle(), &BBox::new(0, 0, 20, 20), &open).await;
        assert!(outcome.is_success());
        assert_eq!(fallback.points().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn total_failure_is_reported() {
        let window = Arc::new(FakeWindow::new());
        let c = clicker(
            window.clone(),
            Arc::new(RecordingEmitter::failing()),
            Arc::new(RecordingEmitter::failing()),
        );
        let outcome = c.click_center(&window.handle(), &BBox::new(0, 0, 20, 20), &open).await;
        assert!(matches!(outcome, ClickOutcome::Failed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cached_rect_used_when_refresh_unavailable() {
        let window = Arc::new(FakeWindow::new());
        let primary = Arc::new(RecordingEmitter::new());
        let c = clicker(window.clone(), primary.clone(), Arc::new(RecordingEmitter::new()));

        let mut handle = window.handle();
        handle.rect = Some(WindowRect::new(5, 5, 105, 105));
        window.set_rect_available(false);
        let outcome = c.click_center(&handle, &BBox::new(0, 0, 10, 10), &open).await;
        assert_eq!(outcome, ClickOutcome::Clicked { x: 10, y: 10 });

        handle.rect = None;
        assert_eq!(c.click_center(&handle, &BBox::new(0, 0, 10, 10), &open).await, ClickOutcome::Unlocated);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_gate_suppresses_both_mechanisms() {
        let window = Arc::new(FakeWindow::new());
        let primary = Arc::new(RecordingEmitter::failing());
        let fallback = Arc::new(RecordingEmitter::new());
        let c = clicker(window.clone(), primary.clone(), fallback.clone());

        let outcome = c.click_center(&window.handle(), &BBox::new(0, 0, 20, 20), &|| false).await;
        assert_eq!(outcome, ClickOutcome::Suppressed);
        assert!(fallback.points().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn gate_is_read_after_slow_rect_refresh() {
        let window = Arc::new(FakeWindow::new());
        window.set_rect_delay(Duration::from_millis(40));
        let primary = Arc::new(RecordingEmitter::new());
        let c = Arc::new(clicker(window.clone(), primary.clone(), Arc::new(RecordingEmitter::new())));
        let allowed = Arc::new(AtomicBool::new(true));

        let click = {
            let (c, window, allowed) = (c.clone(), window.clone(), allowed.clone());
            tokio::spawn(async move {
                let gate = move || allowed.load(Ordering::SeqCst);
                c.click_center(&window.handle(), &BBox::new(0, 0, 10, 10), &gate).await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        allowed.store(false, Ordering::SeqCst);

        assert_eq!(click.await.unwrap(), ClickOutcome::Suppressed);
        assert!(primary.points().is_empty());
    }
}
