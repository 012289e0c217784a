//! Synthetic capture surface (`stub://`) for tests and demos.
//!
//! Produces in-memory gradient frames at the negotiated resolution. Failure
//! modes (refused permission, missing device, slow or absent readiness, frame
//! read errors) are configurable so the controller's error paths can be
//! exercised without hardware.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};

use super::{
    ready_timeout_error, CaptureSurface, DeviceLease, FrameSource, ReadySignal, StreamConstraints,
};
use crate::error::{CaptureError, CaptureErrorKind};
use crate::frame::Frame;

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub name: String,
    /// Resolutions the fake camera offers. Empty means any.
    pub supported_resolutions: Vec<(u32, u32)>,
    /// Fail every `open` with this kind.
    pub failure: Option<CaptureErrorKind>,
    /// Delay between `open` and the "metadata loaded" transition.
    pub ready_delay: Duration,
    /// Never fire readiness.
    pub never_ready: bool,
    /// Fail every frame read after this many frames.
    pub fail_frames_after: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "stub://front_camera".to_string(),
            supported_resolutions: Vec::new(),
            failure: None,
            ready_delay: Duration::ZERO,
            never_ready: false,
            fail_frames_after: None,
        }
    }
}

/// Counters shared between a surface and the sources it opened.
#[derive(Debug, Default)]
struct SurfaceCounters {
    opened: AtomicU64,
    closed: AtomicU64,
}

pub struct SyntheticSurface {
    config: SyntheticConfig,
    in_use: Arc<AtomicBool>,
    counters: Arc<SurfaceCounters>,
}

impl SyntheticSurface {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            in_use: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(SurfaceCounters::default()),
        }
    }

    /// Surface whose every `open` fails with `kind`.
    pub fn failing(kind: CaptureErrorKind) -> Self {
        Self::new(SyntheticConfig {
            failure: Some(kind),
            ..SyntheticConfig::default()
        })
    }

    /// Number of streams opened so far.
    pub fn opened(&self) -> u64 {
        self.counters.opened.load(Ordering::Acquire)
    }

    /// Number of streams closed so far.
    pub fn closed(&self) -> u64 {
        self.counters.closed.load(Ordering::Acquire)
    }

    fn negotiate(&self, constraints: &StreamConstraints) -> Result<(u32, u32), CaptureError> {
        if constraints.audio {
            return Err(CaptureError::new(
                CaptureErrorKind::NegotiationFailed,
                format!("{} has no audio track", self.config.name),
            ));
        }
        let target = constraints.capped_resolution();
        if self.config.supported_resolutions.is_empty() {
            return Ok(target);
        }
        if self.config.supported_resolutions.contains(&target) {
            return Ok(target);
        }
        self.config
            .supported_resolutions
            .iter()
            .copied()
            .filter(|&(w, h)| constraints.accepts(w, h))
            .max_by_key(|&(w, h)| w * h)
            .ok_or_else(|| {
                CaptureError::new(
                    CaptureErrorKind::NegotiationFailed,
                    format!(
                        "{} offers no resolution within {}x{}",
                        self.config.name, constraints.max_width, constraints.max_height
                    ),
                )
            })
    }
}

impl CaptureSurface for SyntheticSurface {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn open(&self, constraints: &StreamConstraints) -> Result<Box<dyn FrameSource>, CaptureError> {
        if let Some(kind) = self.config.failure {
            return Err(CaptureError::new(
                kind,
                format!("{}: simulated {}", self.config.name, kind),
            ));
        }
        let (width, height) = self.negotiate(constraints)?;
        let lease = DeviceLease::acquire(&self.in_use, &self.config.name)?;

        let ready = ReadySignal::new();
        if !self.config.never_ready {
            if self.config.ready_delay.is_zero() {
                ready.fire();
            } else {
                let delay = self.config.ready_delay;
                let signal = ready.clone();
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    signal.fire();
                });
            }
        }

        self.counters.opened.fetch_add(1, Ordering::AcqRel);
        log::info!(
            "SyntheticSurface: opened {} ({}x{})",
            self.config.name,
            width,
            height
        );

        Ok(Box::new(SyntheticSource {
            name: self.config.name.clone(),
            lease: Some(lease),
            ready,
            frame: Frame::empty(width, height),
            width,
            height,
            frames: 0,
            fail_frames_after: self.config.fail_frames_after,
            counters: self.counters.clone(),
        }))
    }

    fn in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }
}

struct SyntheticSource {
    name: String,
    lease: Option<DeviceLease>,
    ready: ReadySignal,
    frame: Frame,
    width: u32,
    height: u32,
    frames: u64,
    fail_frames_after: Option<u64>,
    counters: Arc<SurfaceCounters>,
}

impl FrameSource for SyntheticSource {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn wait_ready(&mut self, timeout: Duration) -> Result<(), CaptureError> {
        if self.ready.wait(timeout) {
            Ok(())
        } else {
            Err(ready_timeout_error(&self.name, timeout))
        }
    }

    fn latest_frame(&mut self) -> Result<Option<&Frame>> {
        if self.lease.is_none() {
            bail!("{} is closed", self.name);
        }
        if !self.ready.is_fired() {
            return Ok(None);
        }
        if self.fail_frames_after.is_some_and(|limit| self.frames >= limit) {
            bail!("{}: simulated frame read failure", self.name);
        }
        self.frames += 1;
        let shade = (self.frames % 256) as u8;
        let (w, h) = (self.width.max(1), self.height.max(1));
        self.frame.fill_with(self.width, self.height, self.frames, |x, y| {
            [(x * 255 / w) as u8, (y * 255 / h) as u8, shade]
        });
        Ok(Some(&self.frame))
    }

    fn close(&mut self) {
        if self.lease.take().is_some() {
            self.counters.closed.fetch_add(1, Ordering::AcqRel);
            log::info!("SyntheticSurface: closed {}", self.name);
        }
    }

    fn is_closed(&self) -> bool {
        self.lease.is_none()
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface() -> SyntheticSurface {
        SyntheticSurface::new(SyntheticConfig::default())
    }

    #[test]
    fn synthetic_source_produces_frames() -> Result<()> {
        let surface = surface();
        let mut source = surface.open(&StreamConstraints::default())?;
        source.wait_ready(Duration::from_secs(1))?;
        assert_eq!(source.resolution(), (640, 480));

        let frame = source.latest_frame()?.expect("frame");
        assert_eq!(frame.width(), 640);
        assert_eq!(frame.height(), 480);
        assert_eq!(frame.sequence(), 1);
        Ok(())
    }

    #[test]
    fn close_is_idempotent_and_releases_device() -> Result<()> {
        let surface = surface();
        let mut source = surface.open(&StreamConstraints::default())?;
        assert!(surface.in_use());
        source.close();
        source.close();
        assert!(!surface.in_use());
        assert!(source.is_closed());
        assert_eq!(surface.closed(), 1);
        assert!(source.latest_frame().is_err());
        Ok(())
    }

    #[test]
    fn second_open_fails_while_leased() -> Result<()> {
        let surface = surface();
        let _source = surface.open(&StreamConstraints::default())?;
        let err = surface.open(&StreamConstraints::default()).err().unwrap();
        assert_eq!(err.kind, CaptureErrorKind::DeviceUnavailable);
        Ok(())
    }

    #[test]
    fn drop_releases_device() -> Result<()> {
        let surface = surface();
        drop(surface.open(&StreamConstraints::default())?);
        assert!(!surface.in_use());
        Ok(())
    }

    #[test]
    fn configured_failure_is_reported() {
        let surface = SyntheticSurface::failing(CaptureErrorKind::PermissionDenied);
        let err = surface.open(&StreamConstraints::default()).err().unwrap();
        assert_eq!(err.kind, CaptureErrorKind::PermissionDenied);
        assert!(!surface.in_use());
    }

    #[test]
    fn negotiation_picks_supported_resolution_under_cap() -> Result<()> {
        let surface = SyntheticSurface::new(SyntheticConfig {
            supported_resolutions: vec![(320, 240), (800, 600), (1920, 1080)],
            ..SyntheticConfig::default()
        });
        let source = surface.open(&StreamConstraints::default())?;
        assert_eq!(source.resolution(), (800, 600));
        Ok(())
    }

    #[test]
    fn negotiation_fails_without_matching_resolution() {
        let surface = SyntheticSurface::new(SyntheticConfig {
            supported_resolutions: vec![(3840, 2160)],
            ..SyntheticConfig::default()
        });
        let err = surface.open(&StreamConstraints::default()).err().unwrap();
        assert_eq!(err.kind, CaptureErrorKind::NegotiationFailed);
    }

    #[test]
    fn readiness_waits_for_delay() -> Result<()> {
        let surface = SyntheticSurface::new(SyntheticConfig {
            never_ready: true,
            ..SyntheticConfig::default()
        });
        let mut source = surface.open(&StreamConstraints::default())?;
        assert!(source.latest_frame()?.is_none());
        let err = source.wait_ready(Duration::from_millis(10)).err().unwrap();
        assert_eq!(err.kind, CaptureErrorKind::InitializationTimeout);
        Ok(())
    }
}
