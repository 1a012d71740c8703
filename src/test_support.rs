//! In-memory fakes for the window, the detector and the pointer.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::config::{ms, AppConfig};
use crate::control::context::ControlContext;
use crate::control::state::LoopMode;
use crate::errors::{GrabError, GrabResult};
use crate::executor::clicker::Clicker;
use crate::executor::input::ClickEmitter;
use crate::perception::traits::{Detector, WindowSource};
use crate::perception::types::{BBox, Category, Detection, Frame, WindowHandle, WindowRect};

pub fn det(category: Category, confidence: f32, bbox: BBox) -> Detection {
    Detection::new(category, confidence, bbox)
}

// ── Window ──────────────────────────────────────────────────────────────────

pub struct FakeWindow {
    title: String,
    rect: Mutex<WindowRect>,
    rect_available: AtomicBool,
    rect_delay: Mutex<Duration>,
    failing_captures: AtomicU32,
    pub raises: AtomicU32,
    pins: Mutex<Vec<bool>>,
}

impl FakeWindow {
    pub const ID: u64 = 1;

    pub fn new() -> Self {
        Self {
            title: "微信 - test".into(),
            rect: Mutex::new(WindowRect::new(100, 200, 500, 600)),
            rect_available: AtomicBool::new(true),
            rect_delay: Mutex::new(Duration::ZERO),
            failing_captures: AtomicU32::new(0),
            raises: AtomicU32::new(0),
            pins: Mutex::new(Vec::new()),
        }
    }

    pub fn handle(&self) -> WindowHandle {
        WindowHandle {
            id: Self::ID,
            title: self.title.clone(),
            rect: Some(self.current_rect()),
        }
    }

    pub fn current_rect(&self) -> WindowRect {
        *self.rect.lock().unwrap()
    }

    pub fn set_rect(&self, rect: WindowRect) {
        *self.rect.lock().unwrap() = rect;
    }

    pub fn set_rect_available(&self, available: bool) {
        self.rect_available.store(available, Ordering::SeqCst);
    }

    /// Make every `rect` lookup take this long, like a full re-enumeration.
    pub fn set_rect_delay(&self, delay: Duration) {
        *self.rect_delay.lock().unwrap() = delay;
    }

    pub fn fail_next_captures(&self, n: u32) {
        self.failing_captures.store(n, Ordering::SeqCst);
    }

    /// Frame coordinates translated by the current rect origin.
    pub fn absolute(&self, x: i32, y: i32) -> (i32, i32) {
        self.current_rect().to_absolute(x, y)
    }

    pub fn raise_count(&self) -> u32 {
        self.raises.load(Ordering::SeqCst)
    }

    pub fn pins(&self) -> Vec<bool> {
        self.pins.lock().unwrap().clone()
    }
}

#[async_trait]
impl WindowSource for FakeWindow {
    async fn find(&self, title_substring: &str) -> Option<WindowHandle> {
        self.title.contains(title_substring).then(|| self.handle())
    }

    async fn find_at(&self, x: i32, y: i32) -> Option<WindowHandle> {
        self.current_rect().contains(x, y).then(|| self.handle())
    }

    async fn rect(&self, handle: &WindowHandle) -> Option<WindowRect> {
        let delay = *self.rect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        (handle.id == Self::ID && self.rect_available.load(Ordering::SeqCst)).then(|| self.current_rect())
    }

    async fn capture(&self, _handle: &WindowHandle) -> Option<Frame> {
        let failing = self
            .failing_captures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return None;
        }
        Some(Frame::new(image::RgbaImage::new(32, 32)))
    }

    async fn raise(&self, _handle: &WindowHandle) {
        self.raises.fetch_add(1, Ordering::SeqCst);
    }

    async fn pin(&self, _handle: &WindowHandle, on_top: bool) {
        self.pins.lock().unwrap().push(on_top);
    }
}

// ── Detector ────────────────────────────────────────────────────────────────

/// Pops scripted results first, then repeats the fallback forever.
pub struct ScriptedDetector {
    script: Mutex<VecDeque<Vec<Detection>>>,
    fallback: Mutex<Vec<Detection>>,
    thresholds: Mutex<Vec<f32>>,
    loaded: AtomicBool,
    panics: AtomicU32,
}

impl ScriptedDetector {
    pub fn always(detections: Vec<Detection>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(detections),
            thresholds: Mutex::new(Vec::new()),
            loaded: AtomicBool::new(true),
            panics: AtomicU32::new(0),
        }
    }

    pub fn push(&self, detections: Vec<Detection>) {
        self.script.lock().unwrap().push_back(detections);
    }

    pub fn set_fallback(&self, detections: Vec<Detection>) {
        *self.fallback.lock().unwrap() = detections;
    }

    pub fn set_loaded(&self, loaded: bool) {
        self.loaded.store(loaded, Ordering::SeqCst);
    }

    /// Panic inside the next `n` calls, after recording them.
    pub fn panic_next(&self, n: u32) {
        self.panics.store(n, Ordering::SeqCst);
    }

    /// Thresholds of every call so far, in order.
    pub fn thresholds(&self) -> Vec<f32> {
        self.thresholds.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.thresholds.lock().unwrap().len()
    }
}

#[async_trait]
impl Detector for ScriptedDetector {
    async fn detect(&self, _frame: &Frame, confidence_threshold: f32) -> GrabResult<Vec<Detection>> {
        self.thresholds.lock().unwrap().push(confidence_threshold);
        if self
            .panics
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            panic!("scripted detector panic");
        }
        let next = self.script.lock().unwrap().pop_front();
        let detections = next.unwrap_or_else(|| self.fallback.lock().unwrap().clone());
        Ok(detections
            .into_iter()
            .filter(|d| d.confidence >= confidence_threshold)
            .collect())
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }
}

// ── Pointer ─────────────────────────────────────────────────────────────────

pub struct RecordingEmitter {
    failing: AtomicBool,
    clicks: Mutex<Vec<(Instant, i32, i32)>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self {
            failing: AtomicBool::new(false),
            clicks: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        let emitter = Self::new();
        emitter.set_failing(true);
        emitter
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn points(&self) -> Vec<(i32, i32)> {
        self.clicks.lock().unwrap().iter().map(|&(_, x, y)| (x, y)).collect()
    }

    /// Every click with the (possibly paused) tokio time it was emitted at.
    pub fn clicks(&self) -> Vec<(Instant, i32, i32)> {
        self.clicks.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClickEmitter for RecordingEmitter {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn emit_click(&self, x: i32, y: i32) -> GrabResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GrabError::Input("recording emitter set to fail".into()));
        }
        self.clicks.lock().unwrap().push((Instant::now(), x, y));
        Ok(())
    }
}

// ── Harness ─────────────────────────────────────────────────────────────────

/// A context wired to the fakes, with the fake window already selected.
pub struct Harness {
    pub ctx: Arc<ControlContext>,
    pub window: Arc<FakeWindow>,
    pub detector: Arc<ScriptedDetector>,
    pub emitter: Arc<RecordingEmitter>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let window = Arc::new(FakeWindow::new());
        let detector = Arc::new(ScriptedDetector::always(Vec::new()));
        let emitter = Arc::new(RecordingEmitter::new());
        let clicker = Clicker::new(
            window.clone(),
            emitter.clone(),
            emitter.clone(),
            ms(config.click.post_click_ms),
        );
        let ctx = Arc::new(ControlContext::new(config, window.clone(), detector.clone(), clicker));
        ctx.set_target(Some(window.handle()));
        Self {
            ctx,
            window,
            detector,
            emitter,
        }
    }

    /// Monitoring with acting armed.
    pub fn acting() -> Self {
        let h = Self::new();
        h.ctx.set_mode(LoopMode::Monitoring);
        h.ctx.enable_acting();
        h
    }

    pub fn elapsed_between_clicks(&self) -> Option<Duration> {
        let clicks = self.emitter.clicks();
        let first = clicks.first()?.0;
        let last = clicks.last()?.0;
        Some(last - first)
    }
}
