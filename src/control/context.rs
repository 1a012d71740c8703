use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::config::{ms, AppConfig};
use crate::control::event_bus::EventBus;
use crate::control::pause::{PauseController, PauseToggle};
use crate::control::state::{LoopEvent, LoopMode};
use crate::control::tasks::{ActionLock, TaskSet};
use crate::errors::{GrabError, GrabResult};
use crate::executor::clicker::{ClickOutcome, Clicker};
use crate::perception::pipeline::{self, Observation};
use crate::perception::traits::{Detector, WindowSource};
use crate::perception::types::{BBox, WindowHandle};

/// Lowest and highest accepted detection threshold.
pub const CONFIDENCE_RANGE: (f32, f32) = (0.05, 1.0);

/// Loop mode shared between the loop, action tasks and the listener.
#[derive(Debug)]
pub struct ModeCell(AtomicU8);

impl ModeCell {
    pub fn new(mode: LoopMode) -> Self {
        Self(AtomicU8::new(mode.as_u8()))
    }

    pub fn get(&self) -> LoopMode {
        LoopMode::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, mode: LoopMode) -> LoopMode {
        LoopMode::from_u8(self.0.swap(mode.as_u8(), Ordering::AcqRel))
    }

    /// Move to `to` only from one of `from`. Returns whether it happened.
    pub fn transition(&self, from: &[LoopMode], to: LoopMode) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                from.contains(&LoopMode::from_u8(raw)).then_some(to.as_u8())
            })
            .is_ok()
    }
}

/// Everything the loop and its spawned tasks share. Passed around as
/// `Arc<ControlContext>`; no module-level state exists.
pub struct ControlContext {
    pub config: AppConfig,
    pub window: Arc<dyn WindowSource>,
    pub detector: Arc<dyn Detector>,
    pub clicker: Clicker,
    pub secondary_lock: ActionLock,
    pub tasks: TaskSet,
    pub events: EventBus,
    mode: ModeCell,
    pause: PauseController,
    confidence_bits: AtomicU32,
    target: RwLock<Option<WindowHandle>>,
}

impl ControlContext {
    pub fn new(
        config: AppConfig,
        window: Arc<dyn WindowSource>,
        detector: Arc<dyn Detector>,
        clicker: Clicker,
    ) -> Self {
        let confidence = clamp_confidence(config.detector.confidence);
        let pause = PauseController::new(ms(config.pause.debounce_ms));
        Self {
            config,
            window,
            detector,
            clicker,
            secondary_lock: ActionLock::new(),
            tasks: TaskSet::new(),
            events: EventBus::new(),
            mode: ModeCell::new(LoopMode::Stopped),
            pause,
            confidence_bits: AtomicU32::new(confidence.to_bits()),
            target: RwLock::new(None),
        }
    }

    // ── Mode ────────────────────────────────────────────────────────────────

    pub fn mode(&self) -> LoopMode {
        self.mode.get()
    }

    /// Only `ActingEnabled` lets a click through.
    pub fn may_click(&self) -> bool {
        self.mode() == LoopMode::ActingEnabled
    }

    pub(crate) fn set_mode(&self, mode: LoopMode) {
        if self.mode.set(mode) != mode {
            tracing::info!(?mode, "mode changed");
            self.events.send(LoopEvent::ModeChanged { mode });
        }
    }

    fn transition(&self, from: &[LoopMode], to: LoopMode) -> bool {
        let changed = self.mode.transition(from, to);
        if changed {
            tracing::info!(mode = ?to, "mode changed");
            self.events.send(LoopEvent::ModeChanged { mode: to });
        }
        changed
    }

    /// Arm click execution. Clears any pause.
    pub fn enable_acting(&self) -> bool {
        let ok = self.transition(&[LoopMode::Monitoring, LoopMode::ActingPaused], LoopMode::ActingEnabled);
        if !ok && !self.mode().is_acting() {
            tracing::warn!(mode = ?self.mode(), "cannot enable acting, monitoring is not running");
        }
        ok
    }

    /// Disarm click execution. In-flight tasks notice on their next check.
    pub fn disable_acting(&self) -> bool {
        self.transition(&[LoopMode::ActingEnabled, LoopMode::ActingPaused], LoopMode::Monitoring)
    }

    pub fn toggle_acting(&self) -> bool {
        if self.mode().is_acting() {
            self.disable_acting()
        } else {
            self.enable_acting()
        }
    }

    pub fn toggle_pause(&self) -> PauseToggle {
        let result = self.pause.toggle(&self.mode);
        match result {
            PauseToggle::Paused => self.events.send(LoopEvent::ModeChanged { mode: LoopMode::ActingPaused }),
            PauseToggle::Resumed => self.events.send(LoopEvent::ModeChanged { mode: LoopMode::ActingEnabled }),
            PauseToggle::Debounced | PauseToggle::NotActing => {}
        }
        result
    }

    // ── Confidence ──────────────────────────────────────────────────────────

    pub fn confidence(&self) -> f32 {
        f32::from_bits(self.confidence_bits.load(Ordering::Relaxed))
    }

    pub fn set_confidence(&self, value: f32) -> f32 {
        let value = clamp_confidence(value);
        self.confidence_bits.store(value.to_bits(), Ordering::Relaxed);
        tracing::info!(confidence = value, "confidence threshold updated");
        value
    }

    /// The loaded config with the live confidence folded in.
    pub fn config_snapshot(&self) -> AppConfig {
        let mut config = self.config.clone();
        config.detector.confidence = self.confidence();
        config
    }

    // ── Target window ───────────────────────────────────────────────────────

    pub fn target(&self) -> Option<WindowHandle> {
        self.target.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn set_target(&self, handle: Option<WindowHandle>) {
        *self.target.write().unwrap_or_else(|e| e.into_inner()) = handle;
    }

    fn cache_rect(&self, observation: &Observation) {
        let mut target = self.target.write().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = target.as_mut() {
            handle.rect = Some(observation.rect);
        }
    }

    // ── Perception / action helpers ─────────────────────────────────────────

    /// Capture the current target and detect at `threshold`.
    pub async fn observe(&self, threshold: f32) -> GrabResult<Observation> {
        let handle = self
            .target()
            .ok_or_else(|| GrabError::Window("no target window selected".into()))?;
        let observation =
            pipeline::observe(self.window.as_ref(), self.detector.as_ref(), &handle, threshold).await?;
        self.cache_rect(&observation);
        Ok(observation)
    }

    pub async fn raise_target(&self) {
        if let Some(handle) = self.target() {
            self.window.raise(&handle).await;
        }
    }

    fn click_target(&self) -> Result<WindowHandle, ClickOutcome> {
        if !self.may_click() {
            tracing::info!(mode = ?self.mode(), "click suppressed");
            return Err(ClickOutcome::Suppressed);
        }
        self.target().ok_or(ClickOutcome::Unlocated)
    }

    /// Click the centre of `bbox`. The mode is checked on entry and again
    /// by the clicker right before each emission.
    pub async fn click(&self, bbox: &BBox) -> ClickOutcome {
        match self.click_target() {
            Ok(handle) => self.clicker.click_center(&handle, bbox, &|| self.may_click()).await,
            Err(outcome) => outcome,
        }
    }

    /// `click` with a caller-chosen pause afterwards; used by the burst.
    pub async fn click_settled(&self, bbox: &BBox, settle: Duration) -> ClickOutcome {
        match self.click_target() {
            Ok(handle) => {
                self.clicker
                    .click_center_settled(&handle, bbox, settle, &|| self.may_click())
                    .await
            }
            Err(outcome) => outcome,
        }
    }
}

fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        return CONFIDENCE_RANGE.0;
    }
    value.clamp(CONFIDENCE_RANGE.0, CONFIDENCE_RANGE.1)
}
