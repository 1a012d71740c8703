/// Return-to-baseline after a primary burst: keep dismissing whatever the
/// burst opened until the secondary target is visible again.
use std::sync::Arc;

use crate::config::ms;
use crate::control::arbiter::DISMISS_ORDER;
use crate::control::context::ControlContext;
use crate::control::state::{ActionKind, LoopEvent, RecoveryOutcome};
use crate::perception::types::{best_of, Category};

pub async fn return_to_baseline(ctx: Arc<ControlContext>) -> RecoveryOutcome {
    let cfg = &ctx.config.recovery;
    let retry_wait = ms(cfg.retry_wait_ms);
    let mut attempts = 0;

    let outcome = loop {
        if attempts >= cfg.max_attempts {
            tracing::warn!(attempts, "baseline not reached, giving up");
            break RecoveryOutcome::Exhausted { attempts };
        }
        if !ctx.may_click() {
            tracing::info!(attempts, mode = ?ctx.mode(), "acting stopped, recovery aborted");
            break RecoveryOutcome::Aborted { attempts };
        }
        attempts += 1;

        let threshold = cfg.lowered_threshold(ctx.confidence());
        let observation = match ctx.observe(threshold).await {
            Ok(o) => o,
            Err(e) => {
                tracing::debug!(attempt = attempts, error = %e, "recovery capture failed");
                tokio::time::sleep(retry_wait).await;
                continue;
            }
        };

        tracing::debug!(attempt = attempts, threshold, count = observation.detections.len(), "recovery observation");
        for d in &observation.detections {
            tracing::debug!(class = %d.class_name, confidence = d.confidence, "  seen");
        }

        if best_of(&observation.detections, Category::SecondaryTarget).is_some() {
            tracing::info!(attempts, "baseline restored");
            break RecoveryOutcome::Restored { attempts };
        }

        let dismiss = DISMISS_ORDER.iter().find_map(|&variant| {
            best_of(&observation.detections, Category::Dismiss(variant)).map(|d| (variant, d.clone()))
        });
        match dismiss {
            Some((variant, target)) => {
                tracing::info!(variant = variant.label(), attempt = attempts, "dismissing towards baseline");
                ctx.raise_target().await;
                tokio::time::sleep(ms(cfg.dismiss_settle_ms)).await;
                let outcome = ctx.click(&target.bbox).await;
                if let Some((x, y)) = outcome.point() {
                    ctx.events.send(LoopEvent::Clicked {
                        action: ActionKind::Recovery,
                        x,
                        y,
                        success: outcome.is_success(),
                    });
                }
                tokio::time::sleep(retry_wait).await;
            }
            None => {
                tracing::info!(attempt = attempts, max = cfg.max_attempts, "no dismiss button visible");
                tokio::time::sleep(retry_wait).await;
            }
        }
    };

    ctx.events.send(LoopEvent::Recovery { outcome });
    outcome
}
