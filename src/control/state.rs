use serde::{Deserialize, Serialize};

use crate::perception::types::DismissVariant;

/// Lifecycle of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    Stopped,
    Monitoring,
    ActingEnabled,
    /// Acting stays armed but no click may be emitted.
    ActingPaused,
}

impl LoopMode {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            LoopMode::Stopped => 0,
            LoopMode::Monitoring => 1,
            LoopMode::ActingEnabled => 2,
            LoopMode::ActingPaused => 3,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => LoopMode::Monitoring,
            2 => LoopMode::ActingEnabled,
            3 => LoopMode::ActingPaused,
            _ => LoopMode::Stopped,
        }
    }

    pub fn is_observing(self) -> bool {
        self != LoopMode::Stopped
    }

    pub fn is_acting(self) -> bool {
        matches!(self, LoopMode::ActingEnabled | LoopMode::ActingPaused)
    }
}

/// Requests handled by the loop task itself.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    StartMonitoring,
    StopMonitoring,
    SelectWindow { title: String },
    SelectAt { x: i32, y: i32 },
    SetConfidence(f32),
    Shutdown,
}

/// Kinds of background task; at most one of each runs at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Secondary,
    Recovery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "variant", rename_all = "snake_case")]
pub enum ActionKind {
    Burst,
    Secondary,
    Dismiss(DismissVariant),
    Recovery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    Restored { attempts: u32 },
    Exhausted { attempts: u32 },
    Aborted { attempts: u32 },
}

/// Messages for the presentation layer. The core never touches UI state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoopEvent {
    ModeChanged { mode: LoopMode },
    WindowSelected { id: u64, title: String },
    Timing {
        fps: f64,
        capture_ms: u64,
        inference_ms: u64,
        detections: usize,
    },
    Clicked {
        action: ActionKind,
        x: i32,
        y: i32,
        success: bool,
    },
    BurstFinished { clicks: u32 },
    Reverified { variant: DismissVariant, confirmed: bool },
    Recovery { outcome: RecoveryOutcome },
    Warning { message: String },
}
