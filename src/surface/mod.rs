//! Capture surfaces: camera stream lifecycle and the frame source handed to
//! inference.
//!
//! - Synthetic source (`stub://` URIs, testing and demos)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! A surface leases its device to one session at a time. The frame source it
//! returns owns the stream until `close()` (or drop) releases it.
//!
//! Frame sources MUST NOT:
//! - Store frames to disk
//! - Retain more than the newest frame
//! - Log frame content

pub mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, CaptureErrorKind};
use crate::frame::Frame;

pub use synthetic::{SyntheticConfig, SyntheticSurface};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Surface;

/// Which way the camera should face.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Front-facing, towards the operator.
    #[default]
    User,
    Environment,
}

/// Requested stream parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamConstraints {
    pub width: u32,
    pub height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub facing: Facing,
    /// Always false for pose capture; kept explicit so surfaces can reject
    /// configurations that would open a microphone.
    pub audio: bool,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            max_width: 1280,
            max_height: 720,
            facing: Facing::User,
            audio: false,
        }
    }
}

impl StreamConstraints {
    /// Target resolution after applying the cap.
    pub fn capped_resolution(&self) -> (u32, u32) {
        (
            self.width.min(self.max_width),
            self.height.min(self.max_height),
        )
    }

    /// Whether a negotiated resolution is acceptable.
    pub fn accepts(&self, width: u32, height: u32) -> bool {
        width > 0 && height > 0 && width <= self.max_width && height <= self.max_height
    }
}

/// Camera-backed surface that can open one frame source at a time.
pub trait CaptureSurface: Send + Sync {
    /// Surface identifier for logs.
    fn name(&self) -> &str;

    /// Request a stream matching the constraints.
    ///
    /// Fails with `DeviceUnavailable`, `PermissionDenied` or
    /// `NegotiationFailed`.
    fn open(&self, constraints: &StreamConstraints) -> Result<Box<dyn FrameSource>, CaptureError>;

    /// Whether a frame source currently holds the device.
    fn in_use(&self) -> bool;
}

/// Live stream handed to the detection loop.
pub trait FrameSource: Send {
    /// Negotiated frame size.
    fn resolution(&self) -> (u32, u32);

    /// Suspend until stream metadata is available or `timeout` elapses.
    fn wait_ready(&mut self, timeout: Duration) -> Result<(), CaptureError>;

    /// Newest frame, or `None` when nothing new has arrived yet.
    ///
    /// The returned frame is overwritten by the next call.
    fn latest_frame(&mut self) -> anyhow::Result<Option<&Frame>>;

    /// Stop the underlying stream. Idempotent.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// Pick a surface implementation for a camera URI.
pub fn from_uri(uri: &str) -> anyhow::Result<Arc<dyn CaptureSurface>> {
    if uri.starts_with("stub://") {
        return Ok(Arc::new(SyntheticSurface::new(SyntheticConfig {
            name: uri.to_string(),
            ..SyntheticConfig::default()
        })));
    }
    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(Arc::new(V4l2Surface::new(uri)))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        anyhow::bail!("camera '{}' requires the ingest-v4l2 feature", uri)
    }
}

// ----------------------------------------------------------------------------
// ReadySignal: "metadata loaded" latch
// ----------------------------------------------------------------------------

/// One-shot latch fired when a stream's metadata becomes available.
#[derive(Clone, Default)]
pub struct ReadySignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ReadySignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        let (lock, cvar) = &*self.inner;
        if let Ok(mut ready) = lock.lock() {
            *ready = true;
            cvar.notify_all();
        }
    }

    pub fn is_fired(&self) -> bool {
        let (lock, _) = &*self.inner;
        lock.lock().map(|ready| *ready).unwrap_or(false)
    }

    /// Block until fired. Returns false when `timeout` elapses first.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let Ok(mut ready) = lock.lock() else {
            return false;
        };
        let deadline = Instant::now() + timeout;
        while !*ready {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            ready = match cvar.wait_timeout(ready, remaining) {
                Ok((guard, _)) => guard,
                Err(_) => return false,
            };
        }
        true
    }
}

pub(crate) fn ready_timeout_error(surface: &str, timeout: Duration) -> CaptureError {
    CaptureError::new(
        CaptureErrorKind::InitializationTimeout,
        format!(
            "{}: stream metadata not ready within {:.1}s",
            surface,
            timeout.as_secs_f32()
        ),
    )
}

// ----------------------------------------------------------------------------
// DeviceLease: one session per surface
// ----------------------------------------------------------------------------

/// Exclusive claim on a surface's device, released on drop.
pub(crate) struct DeviceLease {
    flag: Arc<AtomicBool>,
}

impl DeviceLease {
    pub(crate) fn acquire(flag: &Arc<AtomicBool>, surface: &str) -> Result<Self, CaptureError> {
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CaptureError::new(
                CaptureErrorKind::DeviceUnavailable,
                format!("{} is already in use by another session", surface),
            ));
        }
        Ok(Self { flag: flag.clone() })
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraints_cap_target_resolution() {
        let constraints = StreamConstraints {
            width: 1920,
            height: 1080,
            ..StreamConstraints::default()
        };
        assert_eq!(constraints.capped_resolution(), (1280, 720));
        assert!(constraints.accepts(640, 480));
        assert!(!constraints.accepts(1920, 1080));
        assert!(!constraints.accepts(0, 480));
    }

    #[test]
    fn ready_signal_wakes_waiter() {
        let signal = ReadySignal::new();
        let remote = signal.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.fire();
        });
        assert!(signal.wait(Duration::from_secs(5)));
        assert!(signal.is_fired());
        handle.join().unwrap();
    }

    #[test]
    fn ready_signal_times_out() {
        let signal = ReadySignal::new();
        assert!(!signal.wait(Duration::from_millis(10)));
    }

    #[test]
    fn lease_is_exclusive_until_dropped() {
        let flag = Arc::new(AtomicBool::new(false));
        let lease = DeviceLease::acquire(&flag, "cam").unwrap();
        let err = DeviceLease::acquire(&flag, "cam").err().unwrap();
        assert_eq!(err.kind, CaptureErrorKind::DeviceUnavailable);
        drop(lease);
        assert!(DeviceLease::acquire(&flag, "cam").is_ok());
    }

    #[test]
    fn stub_uri_selects_synthetic_surface() {
        let surface = from_uri("stub://front_camera").unwrap();
        assert_eq!(surface.name(), "stub://front_camera");
        assert!(!surface.in_use());
    }
}
