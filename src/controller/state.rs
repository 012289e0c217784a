use std::fmt;

use crate::assessment::TestDescriptor;
use crate::error::CaptureError;
use crate::pose::Pose;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CaptureState {
    Idle,
    Initializing,
    Detecting,
    CountdownRunning,
    AwaitingGatedCapture,
    Captured,
    Error,
    Closed,
}

impl CaptureState {
    /// Whether the state machine allows `self -> next`.
    ///
    /// `Closed` is reachable from everywhere. So is `Initializing`: from
    /// `Idle`/`Closed` by opening a session, from open states by a hard reset.
    pub fn can_transition_to(self, next: CaptureState) -> bool {
        use CaptureState::*;
        match (self, next) {
            (_, Closed | Initializing) => true,
            (Initializing, Detecting | Error) => true,
            (Detecting, CountdownRunning | Error) => true,
            (CountdownRunning, AwaitingGatedCapture | Error) => true,
            (AwaitingGatedCapture, Captured | Error) => true,
            (Captured, Detecting) => true,
            (Error, Detecting) => true,
            _ => false,
        }
    }

    /// States in which the detection loop runs.
    pub fn is_detecting(self) -> bool {
        matches!(
            self,
            Self::Detecting | Self::CountdownRunning | Self::AwaitingGatedCapture
        )
    }

    /// A session exists and has not been closed.
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Idle | Self::Closed)
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::Detecting => "detecting",
            Self::CountdownRunning => "countdown",
            Self::AwaitingGatedCapture => "awaiting-capture",
            Self::Captured => "captured",
            Self::Error => "error",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Mutable record of one capture session.
///
/// Written only by the controller's event loop. Callers see copies
/// (`SessionSnapshot`) published after every change.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureSession {
    pub session_id: u64,
    pub state: CaptureState,
    pub test: Option<TestDescriptor>,
    pub countdown_remaining: Option<u32>,
    /// Gate score of the most recent detection cycle.
    pub last_confidence: Option<f32>,
    pub captured_pose: Option<Pose>,
    pub last_error: Option<CaptureError>,
    /// Negotiated frame size, known once the stream is ready.
    pub frame_size: Option<(u32, u32)>,
    pub backend: Option<&'static str>,
    pub detection_ticks: u64,
    pub transient_failures: u64,
}

pub type SessionSnapshot = CaptureSession;

impl CaptureSession {
    pub(crate) fn new(session_id: u64, test: Option<TestDescriptor>) -> Self {
        Self {
            session_id,
            state: CaptureState::Idle,
            test,
            countdown_remaining: None,
            last_confidence: None,
            captured_pose: None,
            last_error: None,
            frame_size: None,
            backend: None,
            detection_ticks: 0,
            transient_failures: 0,
        }
    }

    pub fn test_id(&self) -> Option<&str> {
        self.test.as_ref().map(|t| t.id.as_str())
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new(0, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CaptureState::*;

    const ALL: [CaptureState; 8] = [
        Idle,
        Initializing,
        Detecting,
        CountdownRunning,
        AwaitingGatedCapture,
        Captured,
        Error,
        Closed,
    ];

    #[test]
    fn closed_is_reachable_from_everywhere() {
        for state in ALL {
            assert!(state.can_transition_to(Closed), "{} -> closed", state);
        }
    }

    #[test]
    fn happy_path_is_allowed() {
        let path = [
            Idle,
            Initializing,
            Detecting,
            CountdownRunning,
            AwaitingGatedCapture,
            Captured,
            Closed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn capture_needs_the_countdown() {
        assert!(!Detecting.can_transition_to(Captured));
        assert!(!Detecting.can_transition_to(AwaitingGatedCapture));
        assert!(!CountdownRunning.can_transition_to(Captured));
        assert!(!Idle.can_transition_to(Detecting));
    }

    #[test]
    fn timeout_and_retry_return_to_detecting() {
        assert!(AwaitingGatedCapture.can_transition_to(Error));
        assert!(Error.can_transition_to(Detecting));
        assert!(Captured.can_transition_to(Detecting));
    }

    #[test]
    fn initializing_is_reachable_from_every_state() {
        for state in ALL {
            assert!(state.can_transition_to(Initializing), "{} -> initializing", state);
        }
    }
}
