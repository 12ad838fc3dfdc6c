//! Screen capture collaborators: window resolution, capture provider, and the
//! exclusive capture lock.
//!
//! The capture surface is a single shared resource; every capture in the
//! process goes through [`CaptureSurface`] so no two captures interleave, no
//! matter which thread issues them.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// Why a frame was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptureReason {
    /// Candidate frame for first-paint detection
    StartRender,
    /// Document load-complete snapshot
    DocumentComplete,
    /// Periodic video reference frame
    Video,
    /// Final snapshot taken at test finalization
    FullyLoaded,
}

/// Opaque OS window handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u64);

/// Resolved browser windows for one process.
#[derive(Debug, Clone, Copy)]
pub struct BrowserWindows {
    /// Top-level frame window
    pub frame: WindowHandle,
    /// Content document window, when the browser exposes one
    pub document: Option<WindowHandle>,
}

impl BrowserWindows {
    /// Window captures should target: the document window when present,
    /// otherwise the frame window.
    #[must_use]
    pub fn capture_target(&self) -> WindowHandle {
        self.document.unwrap_or(self.frame)
    }
}

/// Locates the browser windows belonging to a process.
///
/// Resolution is best-effort: the browser window may not exist yet when the
/// test starts, in which case the controller retries on the next navigation.
pub trait WindowResolver: Send + Sync {
    /// Find the frame/document windows for `pid`, or `None` if the browser
    /// has not created them yet.
    fn find_browser_window(&self, pid: u32) -> Option<BrowserWindows>;
}

/// Produces in-memory captures of a window.
pub trait CaptureProvider: Send + Sync {
    /// Capture the current contents of `window`. `None` means the capture
    /// failed or produced nothing usable; callers treat that as a missed
    /// capture, never an error.
    fn capture(&self, window: WindowHandle, reason: CaptureReason) -> Option<DynamicImage>;
}

/// A captured frame with its reason and capture-time tick stamp.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Pixel data
    pub image: DynamicImage,
    /// Why the frame was captured
    pub reason: CaptureReason,
    /// Monotonic tick at capture time
    pub at_ticks: u64,
}

/// Capture provider behind the process-wide exclusive capture lock.
pub struct CaptureSurface {
    provider: Arc<dyn CaptureProvider>,
    lock: Mutex<()>,
}

impl std::fmt::Debug for CaptureSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSurface").finish_non_exhaustive()
    }
}

impl CaptureSurface {
    /// Wrap a provider with the exclusive capture lock.
    #[must_use]
    pub fn new(provider: Arc<dyn CaptureProvider>) -> Self {
        Self {
            provider,
            lock: Mutex::new(()),
        }
    }

    /// Take the capture lock for a sequence of operations that must not
    /// interleave with other captures (e.g. capture followed by a pixel scan
    /// of the same surface).
    #[must_use]
    pub fn exclusive(&self) -> SurfaceGuard<'_> {
        SurfaceGuard {
            provider: &*self.provider,
            _guard: self.lock.lock().unwrap(),
        }
    }

    /// Capture one frame under the lock.
    #[must_use]
    pub fn capture(
        &self,
        window: WindowHandle,
        reason: CaptureReason,
        at_ticks: u64,
    ) -> Option<CapturedFrame> {
        self.exclusive().capture(window, reason, at_ticks)
    }
}

/// Exclusive access to the capture surface.
pub struct SurfaceGuard<'a> {
    provider: &'a dyn CaptureProvider,
    _guard: MutexGuard<'a, ()>,
}

impl SurfaceGuard<'_> {
    /// Capture one frame while holding the lock.
    #[must_use]
    pub fn capture(
        &self,
        window: WindowHandle,
        reason: CaptureReason,
        at_ticks: u64,
    ) -> Option<CapturedFrame> {
        self.provider.capture(window, reason).map(|image| CapturedFrame {
            image,
            reason,
            at_ticks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    struct WhiteProvider;

    impl CaptureProvider for WhiteProvider {
        fn capture(&self, _window: WindowHandle, _reason: CaptureReason) -> Option<DynamicImage> {
            Some(DynamicImage::ImageRgb8(RgbImage::from_pixel(
                4,
                4,
                image::Rgb([255, 255, 255]),
            )))
        }
    }

    struct FailingProvider;

    impl CaptureProvider for FailingProvider {
        fn capture(&self, _window: WindowHandle, _reason: CaptureReason) -> Option<DynamicImage> {
            None
        }
    }

    #[test]
    fn test_capture_target_prefers_document() {
        let windows = BrowserWindows {
            frame: WindowHandle(1),
            document: Some(WindowHandle(2)),
        };
        assert_eq!(windows.capture_target(), WindowHandle(2));
    }

    #[test]
    fn test_capture_target_falls_back_to_frame() {
        let windows = BrowserWindows {
            frame: WindowHandle(1),
            document: None,
        };
        assert_eq!(windows.capture_target(), WindowHandle(1));
    }

    #[test]
    fn test_surface_stamps_frame() {
        let surface = CaptureSurface::new(Arc::new(WhiteProvider));
        let frame = surface
            .capture(WindowHandle(1), CaptureReason::Video, 1234)
            .unwrap();
        assert_eq!(frame.reason, CaptureReason::Video);
        assert_eq!(frame.at_ticks, 1234);
    }

    #[test]
    fn test_surface_absorbs_failed_capture() {
        let surface = CaptureSurface::new(Arc::new(FailingProvider));
        assert!(surface
            .capture(WindowHandle(1), CaptureReason::StartRender, 0)
            .is_none());
    }

    #[test]
    fn test_exclusive_guard_captures() {
        let surface = CaptureSurface::new(Arc::new(WhiteProvider));
        let guard = surface.exclusive();
        let frame = guard.capture(WindowHandle(9), CaptureReason::FullyLoaded, 7);
        assert!(frame.is_some());
    }
}
