use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::control::context::ModeCell;
use crate::control::state::LoopMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseToggle {
    Paused,
    Resumed,
    /// Dropped: the previous accepted request was too recent.
    Debounced,
    /// Accepted but meaningless: acting is not enabled.
    NotActing,
}

/// Debounced pause/resume of click execution.
pub struct PauseController {
    quiet_period: Duration,
    last_accepted: Mutex<Option<Instant>>,
}

impl PauseController {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            last_accepted: Mutex::new(None),
        }
    }

    pub fn toggle(&self, mode: &ModeCell) -> PauseToggle {
        let now = Instant::now();
        {
            let mut last = self.last_accepted.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(prev) = *last {
                if now.duration_since(prev) < self.quiet_period {
                    return PauseToggle::Debounced;
                }
            }
            *last = Some(now);
        }

        if mode.transition(&[LoopMode::ActingEnabled], LoopMode::ActingPaused) {
            tracing::info!("acting paused");
            PauseToggle::Paused
        } else if mode.transition(&[LoopMode::ActingPaused], LoopMode::ActingEnabled) {
            tracing::info!("acting resumed");
            PauseToggle::Resumed
        } else {
            tracing::info!(mode = ?mode.get(), "acting not enabled, pause ignored");
            PauseToggle::NotActing
        }
    }
}
