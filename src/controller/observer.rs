use serde::Serialize;

use super::state::CaptureState;
use crate::error::CaptureError;
use crate::gate::Quality;
use crate::pose::NormalizedKeypoint;

/// Payload handed to the caller when a session completes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CaptureHandoff {
    pub session_id: u64,
    pub test_id: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub keypoints: Vec<NormalizedKeypoint>,
}

/// Session notifications, delivered on the controller's event-loop thread.
///
/// Callbacks must return quickly; the next frame is not processed until they
/// do.
pub trait CaptureObserver: Send {
    fn on_transition(&mut self, _from: CaptureState, _to: CaptureState) {}

    fn on_countdown(&mut self, _remaining: u32) {}

    /// Gate score of every detection cycle.
    fn on_quality(&mut self, _score: f32, _quality: Quality) {}

    fn on_error(&mut self, _error: &CaptureError) {}

    /// Called exactly once per completed session.
    fn on_complete(&mut self, _handoff: &CaptureHandoff) {}

    /// The session was closed before completion.
    fn on_close(&mut self) {}
}

pub struct NoopObserver;

impl CaptureObserver for NoopObserver {}
