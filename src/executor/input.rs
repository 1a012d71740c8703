// Physical pointer injection through enigo.
use std::time::Duration;

use async_trait::async_trait;
use enigo::{Button, Coordinate, Direction, Enigo, Mouse, Settings};

use crate::errors::{GrabError, GrabResult};

/// Emit one left click at absolute device coordinates.
#[async_trait]
pub trait ClickEmitter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn emit_click(&self, x: i32, y: i32) -> GrabResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Move,
    Settle,
    Press,
    Release,
}

/// Dwell after the move, then hold the button.
const PRESS_RELEASE: &[Step] = &[Step::Move, Step::Settle, Step::Press, Step::Settle, Step::Release];
/// Press right after the move, still holding the button.
const QUICK_CLICK: &[Step] = &[Step::Move, Step::Press, Step::Settle, Step::Release];

fn input_err(stage: &str, e: impl std::fmt::Display) -> GrabError {
    GrabError::Input(format!("{stage}: {e}"))
}

/// Play `steps` on a fresh connection, on a blocking thread. Enigo is not
/// Send on every platform.
async fn play(steps: &'static [Step], x: i32, y: i32, settle: Duration) -> GrabResult<()> {
    tokio::task::spawn_blocking(move || {
        let mut enigo = Enigo::new(&Settings::default()).map_err(|e| input_err("enigo init", e))?;
        for step in steps {
            match step {
                Step::Move => enigo.move_mouse(x, y, Coordinate::Abs).map_err(|e| input_err("move", e))?,
                Step::Settle => std::thread::sleep(settle),
                Step::Press => enigo.button(Button::Left, Direction::Press).map_err(|e| input_err("press", e))?,
                Step::Release => enigo
                    .button(Button::Left, Direction::Release)
                    .map_err(|e| input_err("release", e))?,
            }
        }
        Ok(())
    })
    .await
    .map_err(|e| input_err("join", e))?
}

/// Move, then separate button-down and button-up with a settle delay.
pub struct PressReleaseEmitter {
    press_settle: Duration,
}

impl PressReleaseEmitter {
    pub fn new(press_settle: Duration) -> Self {
        Self { press_settle }
    }
}

#[async_trait]
impl ClickEmitter for PressReleaseEmitter {
    fn name(&self) -> &'static str {
        "press_release"
    }

    async fn emit_click(&self, x: i32, y: i32) -> GrabResult<()> {
        play(PRESS_RELEASE, x, y, self.press_settle).await
    }
}

/// Fallback: no dwell after the move, but the button is still held for
/// the settle delay.
pub struct SyntheticClickEmitter {
    press_settle: Duration,
}

impl SyntheticClickEmitter {
    pub fn new(press_settle: Duration) -> Self {
        Self { press_settle }
    }
}

#[async_trait]
impl ClickEmitter for SyntheticClickEmitter {
    fn name(&self) -> &'static str {
        "synthetic_click"
    }

    async fn emit_click(&self, x: i32, y: i32) -> GrabResult<()> {
        play(QUICK_CLICK, x, y, self.press_settle).await
    }
}
