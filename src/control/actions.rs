/// Execution of the arbiter's decision for one cycle.
use std::sync::Arc;

use tokio::time::Instant;

use crate::config::ms;
use crate::control::arbiter::Decision;
use crate::control::context::ControlContext;
use crate::control::recovery::return_to_baseline;
use crate::control::reverify::{reverify, Reverified};
use crate::control::state::{ActionKind, LoopEvent, TaskKind};
use crate::control::tasks::ActionLockGuard;
use crate::executor::clicker::ClickOutcome;
use crate::perception::types::{Category, Detection, DismissVariant};

pub async fn execute(ctx: &Arc<ControlContext>, decision: Decision) {
    match decision {
        Decision::Burst(target) => run_burst(ctx, &target).await,
        Decision::Secondary(target) => {
            dispatch_secondary(ctx, target);
        }
        Decision::Dismiss(variant, target) => run_dismiss(ctx, variant, target).await,
        Decision::Held => tracing::debug!("secondary handler in flight, cycle idle"),
        Decision::Idle => {}
    }
}

fn publish_click(ctx: &ControlContext, action: ActionKind, outcome: ClickOutcome) {
    if let Some((x, y)) = outcome.point() {
        ctx.events.send(LoopEvent::Clicked {
            action,
            x,
            y,
            success: outcome.is_success(),
        });
    }
}

/// Click the primary action repeatedly for a fixed wall-clock budget, then
/// hand over to the recovery task.
pub async fn run_burst(ctx: &Arc<ControlContext>, target: &Detection) {
    let cfg = &ctx.config.burst;
    let budget = ms(cfg.duration_ms);
    let interval = ms(cfg.interval_ms);
    tracing::info!(confidence = target.confidence, budget_ms = cfg.duration_ms, "primary action, bursting");

    ctx.raise_target().await;
    tokio::time::sleep(ms(ctx.config.click.raise_settle_ms)).await;

    let start = Instant::now();
    let mut clicks = 0u32;
    let mut last = ClickOutcome::Unlocated;
    while start.elapsed() < budget {
        if !ctx.may_click() {
            tracing::info!(clicks, "burst interrupted");
            break;
        }
        last = ctx.click_settled(&target.bbox, interval).await;
        match last {
            ClickOutcome::Clicked { .. } => clicks += 1,
            // nowhere to click, stop early
            ClickOutcome::Unlocated | ClickOutcome::Suppressed => break,
            ClickOutcome::Failed { .. } => {}
        }
    }
    tracing::info!(clicks, elapsed_ms = start.elapsed().as_millis() as u64, "burst finished");
    publish_click(ctx, ActionKind::Burst, last);
    ctx.events.send(LoopEvent::BurstFinished { clicks });

    tokio::time::sleep(ms(cfg.post_burst_ms)).await;

    if !ctx.may_click() {
        return;
    }
    let recovery_ctx = ctx.clone();
    let launched = ctx.tasks.try_spawn(TaskKind::Recovery, async move {
        return_to_baseline(recovery_ctx).await;
    });
    if launched {
        tracing::info!("recovery task launched");
    }
}

/// Take the single-flight lock and hand the secondary target to a
/// background task. Returns whether a task was started.
pub fn dispatch_secondary(ctx: &Arc<ControlContext>, target: Detection) -> bool {
    let Some(guard) = ctx.secondary_lock.try_acquire() else {
        tracing::debug!("secondary lock held, not dispatching");
        return false;
    };
    let task_ctx = ctx.clone();
    ctx.tasks.try_spawn(TaskKind::Secondary, async move {
        handle_secondary(task_ctx, target, guard).await;
    })
}

async fn handle_secondary(ctx: Arc<ControlContext>, target: Detection, _guard: ActionLockGuard) {
    let cfg = &ctx.config.secondary;
    if !ctx.may_click() {
        return;
    }
    tracing::info!(confidence = target.confidence, "secondary target, handling");
    ctx.raise_target().await;
    tokio::time::sleep(ms(cfg.raise_settle_ms)).await;

    let outcome = ctx.click(&target.bbox).await;
    publish_click(&ctx, ActionKind::Secondary, outcome);
    tokio::time::sleep(ms(cfg.post_click_ms)).await;
}

pub async fn run_dismiss(ctx: &Arc<ControlContext>, variant: DismissVariant, initial: Detection) {
    let cfg = &ctx.config.reverify;
    let delay = match variant {
        DismissVariant::Back => ms(cfg.back_delay_ms),
        DismissVariant::Close => ms(cfg.close_delay_ms),
    };
    ctx.raise_target().await;

    let verdict = reverify(ctx, Category::Dismiss(variant), delay, initial).await;
    ctx.events.send(LoopEvent::Reverified {
        variant,
        confirmed: verdict.should_click(),
    });
    let Reverified::Confirmed(target) = verdict else {
        return;
    };

    tokio::time::sleep(ms(ctx.config.click.raise_settle_ms)).await;
    let outcome = ctx.click(&target.bbox).await;
    tracing::info!(variant = variant.label(), success = outcome.is_success(), "dismiss clicked");
    publish_click(ctx, ActionKind::Dismiss(variant), outcome);
    tokio::time::sleep(ms(cfg.post_click_ms)).await;
}
