use anyhow::Result;

use crate::frame::FrameView;
use crate::pose::RawKeypoint;

/// Hardware class a backend runs on. GPU backends are tried first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Acceleration {
    Gpu,
    Cpu,
}

/// Outcome of one backend inference call, before coercion.
#[derive(Clone, Debug, PartialEq)]
pub enum RawEstimate {
    Keypoints(Vec<RawKeypoint>),
    /// Zero people in the frame.
    NoPerson,
}

/// Registrable pose backend.
///
/// `load` may be slow (model parsing, device setup) and runs on an
/// initialization worker thread.
pub trait PoseBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn acceleration(&self) -> Acceleration;

    /// Load the model and prepare an estimator.
    fn load(&self) -> Result<Box<dyn PoseEstimator>>;
}

/// Loaded single-person pose model.
///
/// # Frame contract
///
/// Implementations receive a borrowed `FrameView` and must treat it as
/// read-only and ephemeral. Nothing derived from the pixels may outlive the
/// call except the returned keypoints.
pub trait PoseEstimator: Send {
    /// Run single-frame, single-person inference.
    fn estimate(&mut self, frame: FrameView<'_>) -> Result<RawEstimate>;

    /// Optional warm-up hook, called once after load.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
