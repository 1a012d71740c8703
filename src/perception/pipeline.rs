/// One observation: refresh the window rectangle, capture, detect.
use std::time::Duration;

use tokio::time::Instant;

use crate::errors::{GrabError, GrabResult};
use crate::perception::traits::{Detector, WindowSource};
use crate::perception::types::{Detection, Frame, WindowHandle, WindowRect};

#[derive(Debug, Clone)]
pub struct Observation {
    pub frame: Frame,
    pub rect: WindowRect,
    pub detections: Vec<Detection>,
    pub capture_time: Duration,
    pub inference_time: Duration,
}

/// Capture the window and run the detector at `confidence_threshold`.
///
/// An unavailable rectangle, a zero-sized window or a failed grab all come
/// back as `GrabError::Capture` so callers can treat them uniformly.
pub async fn observe(
    window: &dyn WindowSource,
    detector: &dyn Detector,
    handle: &WindowHandle,
    confidence_threshold: f32,
) -> GrabResult<Observation> {
    let capture_start = Instant::now();
    let rect = window
        .rect(handle)
        .await
        .ok_or_else(|| GrabError::Capture("window rectangle unavailable".into()))?;
    if !rect.is_capturable() {
        return Err(GrabError::Capture(format!(
            "window has no area ({}x{})",
            rect.width(),
            rect.height()
        )));
    }
    let frame = window
        .capture(handle)
        .await
        .ok_or_else(|| GrabError::Capture("window capture unavailable".into()))?;
    let capture_time = capture_start.elapsed();

    let infer_start = Instant::now();
    let detections = detector.detect(&frame, confidence_threshold).await?;
    let inference_time = infer_start.elapsed();

    tracing::trace!(
        count = detections.len(),
        capture_ms = capture_time.as_millis() as u64,
        inference_ms = inference_time.as_millis() as u64,
        "observation"
    );

    Ok(Observation {
        frame,
        rect,
        detections,
        capture_time,
        inference_time,
    })
}
