use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::control::state::LoopEvent;

/// Fan-out of loop events plus a latest-value slot for the preview image.
pub struct EventBus {
    tx: broadcast::Sender<LoopEvent>,
    preview_tx: watch::Sender<Option<Arc<image::RgbaImage>>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        let (preview_tx, _) = watch::channel(None);
        Self { tx, preview_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoopEvent> {
        self.tx.subscribe()
    }

    pub fn subscribe_preview(&self) -> watch::Receiver<Option<Arc<image::RgbaImage>>> {
        self.preview_tx.subscribe()
    }

    /// Publishing with nobody listening is not an error.
    pub fn send(&self, event: LoopEvent) {
        let _ = self.tx.send(event);
    }

    pub fn send_preview(&self, image: image::RgbaImage) {
        self.preview_tx.send_replace(Some(Arc::new(image)));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::state::LoopMode;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.send(LoopEvent::ModeChanged { mode: LoopMode::Monitoring });
        assert_eq!(rx.recv().await.unwrap(), LoopEvent::ModeChanged { mode: LoopMode::Monitoring });
    }

    #[test]
    fn send_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.send(LoopEvent::Warning { message: "nobody home".into() });
        bus.send_preview(image::RgbaImage::new(2, 2));
        assert!(bus.subscribe_preview().borrow().is_some());
    }
}
