use std::time::Duration;

use crate::control::context::ControlContext;
use crate::perception::types::{best_of, Category, Detection};

#[derive(Debug, Clone, PartialEq)]
pub enum Reverified {
    /// Still there. Click this one; its box may have moved.
    Confirmed(Detection),
    Vanished,
}

impl Reverified {
    pub fn should_click(&self) -> bool {
        matches!(self, Reverified::Confirmed(_))
    }

    pub fn into_target(self) -> Option<Detection> {
        match self {
            Reverified::Confirmed(d) => Some(d),
            Reverified::Vanished => None,
        }
    }
}

/// Wait `delay`, look again at the live threshold and report whether a
/// `category` detection survived.
///
/// A failed re-capture keeps `initial`: the next cycle observes ground
/// truth anyway, so a capture hiccup must not stall the dismiss.
pub async fn reverify(
    ctx: &ControlContext,
    category: Category,
    delay: Duration,
    initial: Detection,
) -> Reverified {
    tracing::info!(?category, delay_ms = delay.as_millis() as u64, "waiting before re-check");
    tokio::time::sleep(delay).await;

    match ctx.observe(ctx.confidence()).await {
        Ok(observation) => match best_of(&observation.detections, category) {
            Some(newest) => {
                tracing::info!(?category, confidence = newest.confidence, "still visible after re-check");
                Reverified::Confirmed(newest.clone())
            }
            None => {
                tracing::info!(?category, "gone after re-check, click cancelled");
                Reverified::Vanished
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "re-check capture failed, keeping original target");
            Reverified::Confirmed(initial)
        }
    }
}
