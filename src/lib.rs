pub mod commands;
pub mod config;
pub mod control;
pub mod errors;
pub mod executor;
pub mod hotkey;
pub mod perception;
pub mod presenter;

#[cfg(test)]
pub(crate) mod test_support;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ms, AppConfig};
use crate::control::context::ControlContext;
use crate::control::engine::control_channel;
use crate::control::state::ControlCommand;
use crate::errors::GrabResult;
use crate::executor::clicker::Clicker;
use crate::executor::input::{PressReleaseEmitter, SyntheticClickEmitter};
use crate::perception::capture::XcapWindowSource;
use crate::perception::classes::{load_class_names, CategoryMap};
use crate::perception::traits::{Detector, WindowSource};
use crate::perception::yolo_detector::{UnloadedDetector, YoloDetector};

pub fn run() -> GrabResult<()> {
    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load config; using defaults");
            AppConfig::default()
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let result = runtime.block_on(serve(config));
    // stdin reader sits on a blocking thread
    runtime.shutdown_timeout(Duration::from_millis(500));
    result
}

fn build_context(config: AppConfig) -> ControlContext {
    let class_names = load_class_names(Path::new(&config.detector.dataset_config));
    let categories = CategoryMap::from_config(&config.detector.categories);
    let detector: Arc<dyn Detector> = match YoloDetector::try_new(
        &config.detector.model_path,
        config.detector.input_size,
        config.detector.iou,
        class_names,
        categories,
    ) {
        Some(d) => Arc::new(d),
        None => Arc::new(UnloadedDetector),
    };

    let window: Arc<dyn WindowSource> = Arc::new(XcapWindowSource::new());
    let clicker = Clicker::new(
        window.clone(),
        Arc::new(PressReleaseEmitter::new(ms(config.click.press_settle_ms))),
        Arc::new(SyntheticClickEmitter::new(ms(config.click.press_settle_ms))),
        ms(config.click.post_click_ms),
    );
    ControlContext::new(config, window, detector, clicker)
}

async fn serve(config: AppConfig) -> GrabResult<()> {
    let ctx = Arc::new(build_context(config));
    let (mut control, handle) = control_channel(ctx.clone());

    let presenter = presenter::spawn_event_presenter(&ctx.events, ctx.config.presentation.clone());
    let preview = presenter::spawn_preview_writer(&ctx.events, ctx.config.preview.clone());

    tracing::info!("spawning control loop");
    let mut loop_task = tokio::spawn(async move {
        control.run_loop().await;
    });

    handle
        .send(ControlCommand::SelectWindow {
            title: ctx.config.window.title.clone(),
        })
        .await?;
    println!("{}", commands::HELP);
    let listener = commands::spawn_console_listener(handle.clone());
    let hotkey_task = hotkey::spawn_hotkey_listener(handle.clone(), &ctx.config.pause);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("ctrl-c received, shutting down");
            if handle.send(ControlCommand::Shutdown).await.is_ok() {
                let _ = (&mut loop_task).await;
            }
        }
        joined = &mut loop_task => {
            if let Err(e) = joined {
                tracing::error!(error = %e, "control loop task failed");
            }
        }
    }

    listener.abort();
    presenter.abort();
    for task in [preview, hotkey_task].into_iter().flatten() {
        task.abort();
    }
    Ok(())
}
