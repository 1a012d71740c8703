use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::ms;
use crate::control::actions;
use crate::control::arbiter::arbitrate;
use crate::control::context::ControlContext;
use crate::control::pause::PauseToggle;
use crate::control::state::{ControlCommand, LoopEvent, LoopMode};
use crate::control::stats::FrameStats;
use crate::errors::{GrabError, GrabResult};
use crate::perception::overlay::render_overlay;
use crate::perception::types::WindowHandle;

const COMMAND_QUEUE: usize = 32;

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// The long-lived observation loop.
pub struct ControlLoop {
    ctx: Arc<ControlContext>,
    commands: mpsc::Receiver<ControlCommand>,
    stats: FrameStats,
}

/// Cheap handle for everything outside the loop task.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlCommand>,
    ctx: Arc<ControlContext>,
}

pub fn control_channel(ctx: Arc<ControlContext>) -> (ControlLoop, ControlHandle) {
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
    let handle = ControlHandle { tx, ctx: ctx.clone() };
    (ControlLoop::new(ctx, rx), handle)
}

impl ControlHandle {
    pub async fn send(&self, command: ControlCommand) -> GrabResult<()> {
        self.tx.send(command).await.map_err(|_| GrabError::ChannelClosed)
    }

    pub fn context(&self) -> &Arc<ControlContext> {
        &self.ctx
    }

    // Applied on the shared context directly so they land even while the
    // loop sits in a re-verify delay.

    pub fn toggle_pause(&self) -> PauseToggle {
        let result = self.ctx.toggle_pause();
        match result {
            PauseToggle::Debounced => tracing::debug!("pause toggle debounced"),
            PauseToggle::NotActing => tracing::info!("pause ignored, acting is not enabled"),
            PauseToggle::Paused | PauseToggle::Resumed => {}
        }
        result
    }

    pub fn toggle_acting(&self) -> bool {
        self.ctx.toggle_acting()
    }

    pub fn enable_acting(&self) -> bool {
        self.ctx.enable_acting()
    }

    pub fn disable_acting(&self) -> bool {
        self.ctx.disable_acting()
    }
}

impl ControlLoop {
    pub fn new(ctx: Arc<ControlContext>, commands: mpsc::Receiver<ControlCommand>) -> Self {
        Self {
            ctx,
            commands,
            stats: FrameStats::new(),
        }
    }

    pub async fn run_loop(&mut self) {
        tracing::info!("control loop ready");
        loop {
            if self.ctx.mode() == LoopMode::Stopped {
                // ── Stopped: block until told otherwise ───────────────────
                match self.commands.recv().await {
                    Some(cmd) => {
                        if self.handle_command(cmd).await == Flow::Exit {
                            break;
                        }
                    }
                    None => break,
                }
                continue;
            }

            // ── Observing: drain commands, then one cycle ─────────────────
            let mut exit = false;
            loop {
                match self.commands.try_recv() {
                    Ok(cmd) => {
                        if self.handle_command(cmd).await == Flow::Exit {
                            exit = true;
                            break;
                        }
                    }
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        exit = true;
                        break;
                    }
                }
            }
            if exit {
                break;
            }
            if self.ctx.mode().is_observing() {
                self.guarded_cycle().await;
            }
        }
        self.stop().await;
        tracing::info!("control loop exited");
    }

    async fn handle_command(&mut self, cmd: ControlCommand) -> Flow {
        tracing::debug!(?cmd, "command");
        match cmd {
            ControlCommand::StartMonitoring => self.start().await,
            ControlCommand::StopMonitoring => self.stop().await,
            ControlCommand::SelectWindow { title } => {
                let found = self.ctx.window.find(&title).await;
                self.select(found, &format!("title containing {title:?}")).await;
            }
            ControlCommand::SelectAt { x, y } => {
                let found = self.ctx.window.find_at(x, y).await;
                self.select(found, &format!("point ({x}, {y})")).await;
            }
            ControlCommand::SetConfidence(value) => {
                self.ctx.set_confidence(value);
            }
            ControlCommand::Shutdown => return Flow::Exit,
        }
        Flow::Continue
    }

    fn warn(&self, message: String) {
        tracing::warn!("{message}");
        self.ctx.events.send(LoopEvent::Warning { message });
    }

    async fn select(&mut self, found: Option<WindowHandle>, what: &str) {
        let Some(handle) = found else {
            self.warn(format!("no window found at {what}"));
            return;
        };
        tracing::info!(id = handle.id, title = %handle.title, "window selected");
        let observing = self.ctx.mode().is_observing();
        if observing {
            if let Some(old) = self.ctx.target() {
                self.ctx.window.pin(&old, false).await;
            }
            self.ctx.window.pin(&handle, true).await;
        }
        self.ctx.events.send(LoopEvent::WindowSelected {
            id: handle.id,
            title: handle.title.clone(),
        });
        self.ctx.set_target(Some(handle));
    }

    async fn start(&mut self) {
        if self.ctx.mode().is_observing() {
            tracing::debug!("already monitoring");
            return;
        }
        let handle = match self.ctx.target() {
            Some(h) => h,
            None => match self.ctx.window.find(&self.ctx.config.window.title).await {
                Some(h) => {
                    self.ctx.set_target(Some(h.clone()));
                    h
                }
                None => {
                    self.warn(format!(
                        "cannot start, no window matching {:?}",
                        self.ctx.config.window.title
                    ));
                    return;
                }
            },
        };
        if !self.ctx.detector.is_loaded() {
            self.warn("cannot start, detector model is not loaded".into());
            return;
        }

        self.ctx.window.raise(&handle).await;
        tokio::time::sleep(ms(self.ctx.config.timing.start_settle_ms)).await;
        self.ctx.window.pin(&handle, true).await;
        self.stats.reset();
        tracing::info!(title = %handle.title, "monitoring started");
        self.ctx.set_mode(LoopMode::Monitoring);
    }

    /// In-flight tasks are left alone; they see the mode and exit.
    async fn stop(&mut self) {
        if !self.ctx.mode().is_observing() {
            return;
        }
        self.ctx.set_mode(LoopMode::Stopped);
        if let Some(handle) = self.ctx.target() {
            self.ctx.window.pin(&handle, false).await;
        }
        tracing::info!(in_flight = self.ctx.tasks.in_flight(), "monitoring stopped");
    }

    /// One cycle. A panic inside it is logged, published and backed off
    /// like any other failed cycle.
    async fn guarded_cycle(&mut self) {
        let Err(panic) = AssertUnwindSafe(self.run_cycle()).catch_unwind().await else {
            return;
        };
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".into());
        let backoff = self.ctx.config.timing.error_backoff_ms;
        tracing::error!(%reason, backoff_ms = backoff, "cycle panicked");
        self.ctx.events.send(LoopEvent::Warning {
            message: format!("cycle panicked: {reason}"),
        });
        tokio::time::sleep(ms(backoff)).await;
    }

    async fn run_cycle(&mut self) {
        let timing = &self.ctx.config.timing;
        let started = Instant::now();
        self.ctx.tasks.reap();

        let observation = match self.ctx.observe(self.ctx.confidence()).await {
            Ok(o) => o,
            Err(e) => {
                let backoff = if e.is_transient() {
                    timing.capture_backoff_ms
                } else {
                    timing.error_backoff_ms
                };
                tracing::warn!(error = %e, backoff_ms = backoff, "cycle skipped");
                tokio::time::sleep(ms(backoff)).await;
                return;
            }
        };

        if let Some(fps) = self
            .stats
            .record(observation.capture_time, observation.inference_time, Instant::now())
        {
            self.ctx.events.send(LoopEvent::Timing {
                fps,
                capture_ms: observation.capture_time.as_millis() as u64,
                inference_ms: observation.inference_time.as_millis() as u64,
                detections: observation.detections.len(),
            });
        }

        if self.ctx.config.preview.enabled {
            let clock = chrono::Local::now().format("%H:%M:%S").to_string();
            let preview = render_overlay(
                &observation.frame,
                &observation.detections,
                self.ctx.mode(),
                &self.stats,
                &clock,
            );
            self.ctx.events.send_preview(preview);
        }

        if self.ctx.may_click() {
            let decision = arbitrate(&observation.detections, self.ctx.secondary_lock.is_held());
            actions::execute(&self.ctx, decision).await;
        }

        let budget = ms(timing.cycle_budget_ms);
        let elapsed = started.elapsed();
        if elapsed < budget {
            tokio::time::sleep(budget - elapsed).await;
        }
    }
}
