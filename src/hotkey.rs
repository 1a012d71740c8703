//! Global pause hotkey.
//!
//! The key state is polled rather than delivered by focus, so the toggle
//! still works after the target window has been raised and pinned over
//! the console.
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::{ms, PauseConfig};
use crate::control::engine::ControlHandle;

/// Rising-edge detection over sampled key state. A held key fires once.
#[derive(Debug, Default)]
pub struct KeyEdge {
    down: bool,
}

impl KeyEdge {
    pub fn pressed(&mut self, down: bool) -> bool {
        let rising = down && !self.down;
        self.down = down;
        rising
    }
}

/// Virtual-key code for a key name: `F1`..`F24`, `Pause`, `ScrollLock`.
pub fn virtual_key(name: &str) -> Option<u16> {
    let upper = name.trim().to_ascii_uppercase();
    match upper.as_str() {
        "PAUSE" => return Some(0x13),
        "SCROLLLOCK" => return Some(0x91),
        _ => {}
    }
    let n: u16 = upper.strip_prefix('F')?.parse().ok()?;
    (1..=24).contains(&n).then(|| 0x70 + n - 1)
}

/// Sample the key every `poll` and toggle pause on each press. Runs until
/// aborted.
pub async fn watch_key<S>(handle: ControlHandle, poll: Duration, mut key_down: S)
where
    S: FnMut() -> bool + Send,
{
    let mut tick = tokio::time::interval(poll);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut edge = KeyEdge::default();
    loop {
        tick.tick().await;
        if edge.pressed(key_down()) {
            tracing::debug!("pause hotkey pressed");
            handle.toggle_pause();
        }
    }
}

/// Start the global listener for `config.hotkey`. `None` when disabled,
/// unknown, or unsupported on this platform.
pub fn spawn_hotkey_listener(handle: ControlHandle, config: &PauseConfig) -> Option<JoinHandle<()>> {
    if config.hotkey.trim().is_empty() {
        tracing::info!("pause hotkey disabled");
        return None;
    }
    let Some(vk) = virtual_key(&config.hotkey) else {
        tracing::warn!(key = %config.hotkey, "unknown pause hotkey, use the console `pause` command");
        return None;
    };
    platform_listener(handle, vk, ms(config.hotkey_poll_ms), &config.hotkey)
}

#[cfg(windows)]
fn platform_listener(handle: ControlHandle, vk: u16, poll: Duration, name: &str) -> Option<JoinHandle<()>> {
    use windows::Win32::UI::Input::KeyboardAndMouse::GetAsyncKeyState;

    tracing::info!(key = %name, "global pause hotkey active");
    let key_down = move || {
        // High bit: the key is down right now.
        let state = unsafe { GetAsyncKeyState(i32::from(vk)) };
        (state as u16) & 0x8000 != 0
    };
    Some(tokio::spawn(watch_key(handle, poll, key_down)))
}

#[cfg(not(windows))]
fn platform_listener(_handle: ControlHandle, _vk: u16, _poll: Duration, name: &str) -> Option<JoinHandle<()>> {
    tracing::info!(key = %name, "global hotkey not supported on this platform, use the console `pause` command");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use crate::control::engine::control_channel;
    use crate::control::state::LoopMode;
    use crate::test_support::Harness;

    #[test]
    fn key_names_map_to_virtual_keys() {
        assert_eq!(virtual_key("F9"), Some(0x78));
        assert_eq!(virtual_key(" f1 "), Some(0x70));
        assert_eq!(virtual_key("F24"), Some(0x87));
        assert_eq!(virtual_key("Pause"), Some(0x13));
        assert_eq!(virtual_key("F0"), None);
        assert_eq!(virtual_key("F25"), None);
        assert_eq!(virtual_key("Ctrl"), None);
    }

    #[test]
    fn held_key_fires_once() {
        let mut edge = KeyEdge::default();
        let fired: Vec<bool> = [false, true, true, true, false, true]
            .into_iter()
            .map(|down| edge.pressed(down))
            .collect();
        assert_eq!(fired, vec![false, true, false, false, false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn key_press_toggles_pause_through_debounce() {
        let h = Harness::acting();
        let (_lp, handle) = control_channel(h.ctx.clone());
        let key = Arc::new(AtomicBool::new(false));
        let sampled = key.clone();
        let watcher = tokio::spawn(watch_key(handle, Duration::from_millis(50), move || {
            sampled.load(Ordering::SeqCst)
        }));

        key.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(h.ctx.mode(), LoopMode::ActingPaused);

        // a second press inside the quiet period is dropped
        key.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        key.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(h.ctx.mode(), LoopMode::ActingPaused);

        key.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(600)).await;
        key.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(h.ctx.mode(), LoopMode::ActingEnabled);
        watcher.abort();
    }

    #[test]
    fn empty_hotkey_disables_listener() {
        let h = Harness::new();
        let (_lp, handle) = control_channel(h.ctx.clone());
        let config = PauseConfig {
            hotkey: String::new(),
            ..PauseConfig::default()
        };
        assert!(spawn_hotkey_listener(handle, &config).is_none());
    }
}
