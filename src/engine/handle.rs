use crate::error::{CaptureError, CaptureErrorKind};
use crate::frame::FrameView;
use crate::pose::{coerce_pose, Pose};

use super::backend::{Acceleration, PoseEstimator, RawEstimate};

/// Result of estimating one frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Estimation {
    Pose(Pose),
    /// Zero people found. Not an error: the controller scores it as 0.
    NoPoseDetected,
}

impl Estimation {
    pub fn pose(&self) -> Option<&Pose> {
        match self {
            Self::Pose(pose) => Some(pose),
            Self::NoPoseDetected => None,
        }
    }
}

/// A loaded engine, held by exactly one session.
pub struct EngineHandle {
    backend: &'static str,
    acceleration: Acceleration,
    estimator: Box<dyn PoseEstimator>,
    estimates: u64,
}

impl EngineHandle {
    pub(crate) fn new(
        backend: &'static str,
        acceleration: Acceleration,
        estimator: Box<dyn PoseEstimator>,
    ) -> Self {
        Self {
            backend,
            acceleration,
            estimator,
            estimates: 0,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend
    }

    pub fn acceleration(&self) -> Acceleration {
        self.acceleration
    }

    /// Number of successful estimates so far.
    pub fn estimates(&self) -> u64 {
        self.estimates
    }

    /// Estimate one frame and coerce the result into a `Pose`.
    ///
    /// Backend failures and malformed keypoint sets are
    /// `TransientInferenceFailure`.
    pub fn estimate(&mut self, frame: FrameView<'_>) -> Result<Estimation, CaptureError> {
        let raw = self.estimator.estimate(frame).map_err(|err| {
            CaptureError::from_anyhow(CaptureErrorKind::TransientInferenceFailure, &err)
        })?;
        let estimation = match raw {
            RawEstimate::NoPerson => Estimation::NoPoseDetected,
            RawEstimate::Keypoints(keypoints) => {
                let pose = coerce_pose(&keypoints).map_err(|err| {
                    CaptureError::from_anyhow(CaptureErrorKind::TransientInferenceFailure, &err)
                })?;
                Estimation::Pose(pose)
            }
        };
        self.estimates += 1;
        Ok(estimation)
    }

    /// Detach the model. Dropping the handle has the same effect.
    pub fn release(self) {
        log::info!(
            "pose engine {} released after {} estimates",
            self.backend,
            self.estimates
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backends::{StubBackend, StubOutput};
    use crate::engine::PoseBackend;
    use crate::frame::Frame;
    use crate::pose::{KeypointIndex, RawKeypoint};

    fn handle_for(backend: StubBackend) -> EngineHandle {
        let estimator = backend.load().unwrap();
        EngineHandle::new(backend.name(), backend.acceleration(), estimator)
    }

    #[test]
    fn no_person_is_not_an_error() {
        let mut handle =
            handle_for(StubBackend::new(Acceleration::Cpu).with_script(|_| StubOutput::NoPerson));
        let frame = Frame::empty(4, 4);
        assert_eq!(
            handle.estimate(frame.view()).unwrap(),
            Estimation::NoPoseDetected
        );
        assert_eq!(handle.estimates(), 1);
    }

    #[test]
    fn backend_failure_is_transient() {
        let mut handle =
            handle_for(StubBackend::new(Acceleration::Cpu).with_script(|_| StubOutput::Fail));
        let frame = Frame::empty(4, 4);
        let err = handle.estimate(frame.view()).err().unwrap();
        assert_eq!(err.kind, CaptureErrorKind::TransientInferenceFailure);
        assert_eq!(handle.estimates(), 0);
    }

    #[test]
    fn labeled_keypoints_are_coerced() {
        let mut handle = handle_for(StubBackend::new(Acceleration::Cpu).with_script(|_| {
            StubOutput::Keypoints(vec![RawKeypoint::labeled("leftWrist", 12.0, 34.0, 0.7)])
        }));
        let frame = Frame::empty(4, 4);
        let estimation = handle.estimate(frame.view()).unwrap();
        let pose = estimation.pose().unwrap();
        assert_eq!(pose.get(KeypointIndex::LeftWrist).x(), 12.0);
        assert_eq!(pose.get(KeypointIndex::Nose).confidence(), 0.0);
    }

    #[test]
    fn malformed_keypoints_are_transient() {
        let mut handle = handle_for(StubBackend::new(Acceleration::Cpu).with_script(|_| {
            StubOutput::Keypoints(vec![RawKeypoint::positional(1.0, 1.0, 0.9); 3])
        }));
        let frame = Frame::empty(4, 4);
        let err = handle.estimate(frame.view()).err().unwrap();
        assert_eq!(err.kind, CaptureErrorKind::TransientInferenceFailure);
    }
}
