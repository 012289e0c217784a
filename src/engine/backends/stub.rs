use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::engine::backend::{Acceleration, PoseBackend, PoseEstimator, RawEstimate};
use crate::frame::FrameView;
use crate::pose::{KeypointIndex, RawKeypoint};

/// Frame facts a stub script may react to.
#[derive(Clone, Copy, Debug)]
pub struct StubContext {
    pub width: u32,
    pub height: u32,
    pub frame_sequence: u64,
    /// Zero-based count of `estimate` calls on this estimator.
    pub call: u64,
}

/// What the stub reports for one frame.
#[derive(Clone, Debug)]
pub enum StubOutput {
    Keypoints(Vec<RawKeypoint>),
    NoPerson,
    Fail,
}

type Script = Arc<dyn Fn(StubContext) -> StubOutput + Send + Sync>;

/// Scripted backend for tests and demos.
///
/// By default it reports a standing figure at confidence 0.9 centred in the
/// frame.
#[derive(Clone)]
pub struct StubBackend {
    name: &'static str,
    acceleration: Acceleration,
    fail_load: bool,
    load_delay: Duration,
    script: Script,
    live: Arc<AtomicUsize>,
}

impl StubBackend {
    pub fn new(acceleration: Acceleration) -> Self {
        Self::named("stub", acceleration)
    }

    pub fn named(name: &'static str, acceleration: Acceleration) -> Self {
        Self {
            name,
            acceleration,
            fail_load: false,
            load_delay: Duration::ZERO,
            script: Arc::new(|ctx| {
                StubOutput::Keypoints(standing_figure(ctx.width, ctx.height, 0.9))
            }),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make `load` fail, e.g. to simulate a missing GPU.
    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    /// Block `load` for `delay`, like a slow model download.
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Estimators loaded from this backend (or its clones) and not yet
    /// dropped.
    pub fn live_estimators(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn with_script(
        mut self,
        script: impl Fn(StubContext) -> StubOutput + Send + Sync + 'static,
    ) -> Self {
        self.script = Arc::new(script);
        self
    }
}

impl PoseBackend for StubBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn acceleration(&self) -> Acceleration {
        self.acceleration
    }

    fn load(&self) -> Result<Box<dyn PoseEstimator>> {
        if !self.load_delay.is_zero() {
            std::thread::sleep(self.load_delay);
        }
        if self.fail_load {
            bail!("{}: simulated load failure", self.name);
        }
        self.live.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(StubEstimator {
            script: self.script.clone(),
            calls: 0,
            live: self.live.clone(),
        }))
    }
}

struct StubEstimator {
    script: Script,
    calls: u64,
    live: Arc<AtomicUsize>,
}

impl Drop for StubEstimator {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

impl PoseEstimator for StubEstimator {
    fn estimate(&mut self, frame: FrameView<'_>) -> Result<RawEstimate> {
        let ctx = StubContext {
            width: frame.width(),
            height: frame.height(),
            frame_sequence: frame.sequence(),
            call: self.calls,
        };
        self.calls += 1;
        match (self.script)(ctx) {
            StubOutput::Keypoints(keypoints) => Ok(RawEstimate::Keypoints(keypoints)),
            StubOutput::NoPerson => Ok(RawEstimate::NoPerson),
            StubOutput::Fail => bail!("simulated inference failure on frame {}", ctx.frame_sequence),
        }
    }
}

/// Labeled keypoints of an upright figure filling the middle of the frame.
pub fn standing_figure(width: u32, height: u32, confidence: f32) -> Vec<RawKeypoint> {
    // (x, y) as fractions of the frame.
    const LAYOUT: [(f32, f32); KeypointIndex::COUNT] = [
        (0.50, 0.12),
        (0.48, 0.10),
        (0.52, 0.10),
        (0.46, 0.11),
        (0.54, 0.11),
        (0.42, 0.24),
        (0.58, 0.24),
        (0.38, 0.38),
        (0.62, 0.38),
        (0.36, 0.50),
        (0.64, 0.50),
        (0.45, 0.52),
        (0.55, 0.52),
        (0.45, 0.70),
        (0.55, 0.70),
        (0.45, 0.88),
        (0.55, 0.88),
    ];
    let (w, h) = (width as f32, height as f32);
    KeypointIndex::ALL
        .iter()
        .zip(LAYOUT)
        .map(|(index, (fx, fy))| RawKeypoint::labeled(index.label(), fx * w, fy * h, confidence))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    #[test]
    fn default_script_reports_standing_figure() -> Result<()> {
        let backend = StubBackend::new(Acceleration::Cpu);
        let mut estimator = backend.load()?;
        let frame = Frame::empty(640, 480);
        let RawEstimate::Keypoints(keypoints) = estimator.estimate(frame.view())? else {
            panic!("expected keypoints");
        };
        assert_eq!(keypoints.len(), 17);
        assert_eq!(keypoints[0].label.as_deref(), Some("nose"));
        assert_eq!(keypoints[0].x, 320.0);
        assert_eq!(keypoints[0].score, Some(0.9));
        Ok(())
    }

    #[test]
    fn script_sees_call_counter() -> Result<()> {
        let backend = StubBackend::new(Acceleration::Cpu).with_script(|ctx| {
            if ctx.call < 2 {
                StubOutput::NoPerson
            } else {
                StubOutput::Fail
            }
        });
        let mut estimator = backend.load()?;
        let frame = Frame::empty(2, 2);
        assert_eq!(estimator.estimate(frame.view())?, RawEstimate::NoPerson);
        assert_eq!(estimator.estimate(frame.view())?, RawEstimate::NoPerson);
        assert!(estimator.estimate(frame.view()).is_err());
        Ok(())
    }

    #[test]
    fn live_estimators_track_drops() -> Result<()> {
        let backend = StubBackend::new(Acceleration::Cpu);
        let first = backend.load()?;
        let second = backend.clone().load()?;
        assert_eq!(backend.live_estimators(), 2);
        drop(first);
        drop(second);
        assert_eq!(backend.live_estimators(), 0);
        Ok(())
    }

    #[test]
    fn failing_load_reports_error() {
        let backend = StubBackend::new(Acceleration::Gpu).failing_load();
        assert!(backend.load().is_err());
    }
}
