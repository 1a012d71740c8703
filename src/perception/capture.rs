/// Window lookup and capture backed by `xcap`.
///
/// `xcap` window objects are not guaranteed to be `Send`, so every call
/// re-enumerates on a blocking thread and resolves the handle by id.
use async_trait::async_trait;

use crate::perception::traits::WindowSource;
use crate::perception::types::{Frame, WindowHandle, WindowRect};

pub struct XcapWindowSource;

impl XcapWindowSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for XcapWindowSource {
    fn default() -> Self {
        Self::new()
    }
}

fn window_rect(window: &xcap::Window) -> WindowRect {
    let left = window.x();
    let top = window.y();
    WindowRect::new(left, top, left + window.width() as i32, top + window.height() as i32)
}

fn handle_of(window: &xcap::Window) -> WindowHandle {
    WindowHandle {
        id: window.id() as u64,
        title: window.title().to_string(),
        rect: Some(window_rect(window)),
    }
}

fn all_windows() -> Vec<xcap::Window> {
    match xcap::Window::all() {
        Ok(windows) => windows,
        Err(e) => {
            tracing::warn!(error = %e, "window enumeration failed");
            Vec::new()
        }
    }
}

fn lookup(id: u64) -> Option<xcap::Window> {
    all_windows().into_iter().find(|w| w.id() as u64 == id)
}

async fn blocking<T, F>(f: F) -> Option<T>
where
    F: FnOnce() -> Option<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "window task join failed");
            None
        }
    }
}

#[async_trait]
impl WindowSource for XcapWindowSource {
    async fn find(&self, title_substring: &str) -> Option<WindowHandle> {
        let needle = title_substring.to_string();
        blocking(move || {
            all_windows()
                .iter()
                .filter(|w| !w.is_minimized())
                .find(|w| w.title().contains(&needle))
                .map(handle_of)
        })
        .await
    }

    async fn find_at(&self, x: i32, y: i32) -> Option<WindowHandle> {
        // Enumeration order is front-to-back, so the first hit is topmost.
        blocking(move || {
            all_windows()
                .iter()
                .filter(|w| !w.is_minimized() && !w.title().is_empty())
                .find(|w| window_rect(w).contains(x, y))
                .map(handle_of)
        })
        .await
    }

    async fn rect(&self, handle: &WindowHandle) -> Option<WindowRect> {
        let id = handle.id;
        blocking(move || lookup(id).map(|w| window_rect(&w))).await
    }

    async fn capture(&self, handle: &WindowHandle) -> Option<Frame> {
        let id = handle.id;
        blocking(move || {
            let window = lookup(id)?;
            if window.is_minimized() || !window_rect(&window).is_capturable() {
                return None;
            }
            match window.capture_image() {
                Ok(image) if image.width() > 0 && image.height() > 0 => Some(Frame::new(image)),
                Ok(_) => None,
                Err(e) => {
                    tracing::debug!(error = %e, "capture_image failed");
                    None
                }
            }
        })
        .await
    }

    async fn raise(&self, handle: &WindowHandle) {
        let id = handle.id;
        let _ = blocking(move || {
            platform::raise(id);
            Some(())
        })
        .await;
    }

    async fn pin(&self, handle: &WindowHandle, on_top: bool) {
        let id = handle.id;
        let _ = blocking(move || {
            platform::pin(id, on_top);
            Some(())
        })
        .await;
    }
}

#[cfg(windows)]
mod platform {
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::WindowsAndMessaging::{
        IsIconic, SetForegroundWindow, SetWindowPos, ShowWindow, HWND_NOTOPMOST, HWND_TOPMOST,
        SWP_NOMOVE, SWP_NOSIZE, SW_RESTORE,
    };

    fn hwnd(id: u64) -> HWND {
        HWND(id as usize as *mut core::ffi::c_void)
    }

    pub fn raise(id: u64) {
        let hwnd = hwnd(id);
        unsafe {
            if IsIconic(hwnd).as_bool() {
                let _ = ShowWindow(hwnd, SW_RESTORE);
            }
            if !SetForegroundWindow(hwnd).as_bool() {
                tracing::warn!(id, "SetForegroundWindow refused");
            }
        }
    }

    pub fn pin(id: u64, on_top: bool) {
        let after = if on_top { HWND_TOPMOST } else { HWND_NOTOPMOST };
        let result = unsafe { SetWindowPos(hwnd(id), after, 0, 0, 0, 0, SWP_NOMOVE | SWP_NOSIZE) };
        if let Err(e) = result {
            tracing::warn!(id, on_top, error = %e, "SetWindowPos failed");
        }
    }
}

#[cfg(not(windows))]
mod platform {
    pub fn raise(id: u64) {
        tracing::debug!(id, "raise not supported on this platform");
    }

    pub fn pin(id: u64, on_top: bool) {
        tracing::debug!(id, on_top, "pin not supported on this platform");
    }
}
