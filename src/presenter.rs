//! Presentation side of the event channel: logs loop events, optionally
//! prints them as JSON lines, and writes the latest preview frame to disk.
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::config::{ms, PresentationConfig, PreviewConfig};
use crate::control::event_bus::EventBus;
use crate::control::state::LoopEvent;
use crate::errors::{GrabError, GrabResult};

#[derive(Serialize)]
struct Envelope<'a> {
    ts: String,
    #[serde(flatten)]
    event: &'a LoopEvent,
}

pub fn event_json(event: &LoopEvent) -> GrabResult<String> {
    let envelope = Envelope {
        ts: chrono::Utc::now().to_rfc3339(),
        event,
    };
    Ok(serde_json::to_string(&envelope)?)
}

fn log_event(event: &LoopEvent) {
    match event {
        LoopEvent::ModeChanged { mode } => tracing::info!(?mode, "mode"),
        LoopEvent::WindowSelected { id, title } => tracing::info!(id, %title, "target window"),
        LoopEvent::Timing {
            fps,
            capture_ms,
            inference_ms,
            detections,
        } => tracing::info!(fps = %format!("{fps:.1}"), capture_ms, inference_ms, detections, "perf"),
        LoopEvent::Clicked { action, x, y, success } => tracing::info!(?action, x, y, success, "click"),
        LoopEvent::BurstFinished { clicks } => tracing::info!(clicks, "burst"),
        LoopEvent::Reverified { variant, confirmed } => {
            tracing::info!(variant = variant.label(), confirmed, "re-verified")
        }
        LoopEvent::Recovery { outcome } => tracing::info!(?outcome, "recovery"),
        LoopEvent::Warning { message } => tracing::warn!("{message}"),
    }
}

pub fn spawn_event_presenter(bus: &EventBus, cfg: PresentationConfig) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if cfg.json_events {
                        match event_json(&event) {
                            Ok(line) => println!("{line}"),
                            Err(e) => tracing::warn!(error = %e, "event encode failed"),
                        }
                    } else {
                        log_event(&event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "presenter lagging, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

pub async fn write_preview(image: Arc<image::RgbaImage>, path: PathBuf) -> GrabResult<()> {
    tokio::task::spawn_blocking(move || {
        image.save_with_format(&path, image::ImageFormat::Png)?;
        Ok(())
    })
    .await
    .map_err(|e| GrabError::Io(std::io::Error::other(e)))?
}

/// Writes the newest preview at most once per `interval_ms`.
pub fn spawn_preview_writer(bus: &EventBus, cfg: PreviewConfig) -> Option<JoinHandle<()>> {
    if !cfg.enabled {
        return None;
    }
    let mut rx: watch::Receiver<Option<Arc<image::RgbaImage>>> = bus.subscribe_preview();
    let path = PathBuf::from(&cfg.path);
    let interval = ms(cfg.interval_ms);
    tracing::info!(path = %path.display(), "preview enabled");
    Some(tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let latest = rx.borrow_and_update().clone();
            if let Some(image) = latest {
                if let Err(e) = write_preview(image, path.clone()).await {
                    tracing::warn!(error = %e, "preview not written");
                }
            }
            tokio::time::sleep(interval).await;
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::state::LoopMode;

    #[test]
    fn json_line_carries_tag_and_timestamp() {
        let line = event_json(&LoopEvent::ModeChanged { mode: LoopMode::ActingPaused }).unwrap();
        let v: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["event"], "mode_changed");
        assert_eq!(v["mode"], "acting_paused");
        assert!(chrono::DateTime::parse_from_rfc3339(v["ts"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn preview_is_written_as_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.png");
        let bus = EventBus::new();
        let cfg = PreviewConfig {
            enabled: true,
            path: path.to_string_lossy().into_owned(),
            interval_ms: 10,
        };
        let writer = spawn_preview_writer(&bus, cfg).unwrap();
        bus.send_preview(image::RgbaImage::new(8, 6));

        let mut written = None;
        for _ in 0..200 {
            if let Ok(img) = image::open(&path) {
                written = Some(img);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        writer.abort();
        let written = written.expect("preview never written");
        assert_eq!((written.width(), written.height()), (8, 6));
    }

    #[test]
    fn disabled_preview_spawns_nothing() {
        let bus = EventBus::new();
        assert!(spawn_preview_writer(&bus, PreviewConfig::default()).is_none());
    }
}
