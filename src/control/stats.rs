use std::time::Duration;

use tokio::time::Instant;

/// Windowed frame-rate and timing meter.
///
/// Frames are counted over a window of `WINDOW`; the rate is recomputed
/// once the window has elapsed and held until the next recomputation.
#[derive(Debug)]
pub struct FrameStats {
    window_start: Option<Instant>,
    frames: u32,
    fps: f64,
    pub capture: Duration,
    pub inference: Duration,
}

impl FrameStats {
    pub const WINDOW: Duration = Duration::from_secs(1);

    pub fn new() -> Self {
        Self {
            window_start: None,
            frames: 0,
            fps: 0.0,
            capture: Duration::ZERO,
            inference: Duration::ZERO,
        }
    }

    /// Count one frame. Returns the new rate when a window closed.
    pub fn record(&mut self, capture: Duration, inference: Duration, now: Instant) -> Option<f64> {
        self.capture = capture;
        self.inference = inference;
        self.frames += 1;

        let start = *self.window_start.get_or_insert(now);
        let elapsed = now.saturating_duration_since(start);
        if elapsed < Self::WINDOW {
            return None;
        }
        self.fps = f64::from(self.frames) / elapsed.as_secs_f64();
        self.frames = 0;
        self.window_start = Some(now);
        Some(self.fps)
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn rate_published_once_per_window() {
        let mut stats = FrameStats::new();
        let t0 = Instant::now();
        let ms = Duration::from_millis;

        // 30 ms cycles: frames at 0, 30, ..., 990 stay inside the first window
        for i in 0..34 {
            assert!(stats.record(ms(5), ms(20), t0 + ms(30 * i)).is_none());
        }
        let fps = stats.record(ms(5), ms(20), t0 + ms(1020)).unwrap();
        assert!((fps - 35.0 / 1.02).abs() < 1e-9);
        assert_eq!(stats.fps(), fps);
        assert_eq!(stats.inference, ms(20));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_rate() {
        let mut stats = FrameStats::new();
        let t0 = Instant::now();
        stats.record(Duration::ZERO, Duration::ZERO, t0);
        stats.record(Duration::ZERO, Duration::ZERO, t0 + Duration::from_secs(2));
        assert!(stats.fps() > 0.0);
        stats.reset();
        assert_eq!(stats.fps(), 0.0);
    }
}
