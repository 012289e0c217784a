//! Capture controller: the pose capture state machine.
//!
//! ```text
//! Idle -> Initializing -> Detecting -> CountdownRunning -> AwaitingGatedCapture -> Captured -> Closed
//!
//! Initializing         -> Error               (fatal: camera, model, init timeout)
//! AwaitingGatedCapture -> Error -> Detecting  (capture timeout)
//! Captured             -> Detecting           (retry)
//! any                  -> Closed | Initializing (close, hard reset)
//! ```
//!
//! `CaptureController` is a handle to an event-loop thread that owns the
//! session. Commands block until the loop has applied them; progress is
//! observed through `snapshot`, `wait_until` or a `CaptureObserver`.

mod activity;
mod observer;
mod runtime;
mod state;

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};

pub use observer::{CaptureHandoff, CaptureObserver, NoopObserver};
pub use state::{CaptureSession, CaptureState, SessionSnapshot};

use crate::assessment::TestDescriptor;
use crate::engine::BackendRegistry;
use crate::error::{CaptureError, CaptureErrorKind};
use crate::gate::ConfidenceGate;
use crate::overlay::{Canvas, OverlayRenderer, OverlaySurface};
use crate::pose::NormalizedKeypoint;
use crate::surface::{CaptureSurface, StreamConstraints};
use activity::Scheduler;
use runtime::{Command, Message, Published, Reply, Runtime};

/// Timing budget of a session.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureTimings {
    /// Wait for stream metadata after opening the camera. Also bounds how
    /// long frame reads may keep failing before the camera counts as lost.
    pub camera_ready: Duration,
    pub init_timeout: Duration,
    pub capture_timeout: Duration,
    pub countdown_ticks: u32,
    pub countdown_interval: Duration,
    /// Delay between the end of one detection cycle and the next.
    pub frame_interval: Duration,
}

impl Default for CaptureTimings {
    fn default() -> Self {
        Self {
            camera_ready: Duration::from_secs(10),
            init_timeout: Duration::from_secs(30),
            capture_timeout: Duration::from_secs(10),
            countdown_ticks: 3,
            countdown_interval: Duration::from_secs(1),
            frame_interval: Duration::from_millis(16),
        }
    }
}

pub struct ControllerBuilder {
    surface: Arc<dyn CaptureSurface>,
    registry: Arc<BackendRegistry>,
    constraints: StreamConstraints,
    renderer: OverlayRenderer,
    overlay: Box<dyn OverlaySurface>,
    gate: ConfidenceGate,
    timings: CaptureTimings,
    observer: Box<dyn CaptureObserver>,
}

impl ControllerBuilder {
    pub fn constraints(mut self, constraints: StreamConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn renderer(mut self, renderer: OverlayRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn overlay(mut self, overlay: impl OverlaySurface + 'static) -> Self {
        self.overlay = Box::new(overlay);
        self
    }

    pub fn gate(mut self, gate: ConfidenceGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn timings(mut self, timings: CaptureTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn observer(mut self, observer: impl CaptureObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Start the event loop.
    pub fn spawn(self) -> Result<CaptureController> {
        let (tx, rx) = mpsc::channel();
        let published = Arc::new(Published::new());
        let runtime = Runtime {
            rx,
            tx: tx.clone(),
            surface: self.surface,
            registry: self.registry,
            constraints: self.constraints,
            renderer: self.renderer,
            overlay: self.overlay,
            gate: self.gate,
            timings: self.timings,
            observer: self.observer,
            published: published.clone(),
            session: CaptureSession::default(),
            generation: 0,
            next_session_id: 0,
            scheduler: Scheduler::new(),
            source: None,
            engine: None,
            source_failing_since: None,
        };
        let join = std::thread::Builder::new()
            .name("capture-controller".to_string())
            .spawn(move || runtime.run())
            .context("spawn capture controller thread")?;
        Ok(CaptureController {
            tx,
            published,
            join: Some(join),
        })
    }
}

/// Handle to a running capture controller. Dropping it closes any open
/// session and stops the loop.
pub struct CaptureController {
    tx: Sender<Message>,
    published: Arc<Published>,
    join: Option<JoinHandle<()>>,
}

impl CaptureController {
    pub fn builder(
        surface: Arc<dyn CaptureSurface>,
        registry: Arc<BackendRegistry>,
    ) -> ControllerBuilder {
        ControllerBuilder {
            surface,
            registry,
            constraints: StreamConstraints::default(),
            renderer: OverlayRenderer::default(),
            overlay: Box::new(Canvas::new(0, 0)),
            gate: ConfidenceGate::default(),
            timings: CaptureTimings::default(),
            observer: Box::new(NoopObserver),
        }
    }

    /// Open a session for `test` and start camera and model setup. Returns
    /// once the session is `Initializing`.
    pub fn open(&self, test: TestDescriptor) -> Result<(), CaptureError> {
        self.request(|reply| Command::Open(test, reply))
    }

    pub fn start_countdown(&self) -> Result<(), CaptureError> {
        self.request(Command::StartCountdown)
    }

    /// Discard the captured pose and resume detection.
    pub fn retry(&self) -> Result<(), CaptureError> {
        self.request(Command::Retry)
    }

    /// Hand off the captured pose and close the session.
    pub fn complete(&self) -> Result<Vec<NormalizedKeypoint>, CaptureError> {
        self.request(Command::Complete)
    }

    /// Tear everything down and initialize again with the same test.
    pub fn hard_reset(&self) -> Result<(), CaptureError> {
        self.request(Command::HardReset)
    }

    /// Close the session from any state. Never fails.
    ///
    /// With no session (`Idle`, or already `Closed`) there is nothing to
    /// release, so the state is left unchanged and `on_close` does not fire.
    pub fn close(&self) {
        let (reply, done) = mpsc::channel();
        if self
            .tx
            .send(Message::Command(Command::Close(reply)))
            .is_ok()
        {
            let _ = done.recv();
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.published.snapshot()
    }

    /// Block until the published session satisfies `predicate`, or `None`
    /// after `timeout`.
    pub fn wait_until(
        &self,
        timeout: Duration,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Option<SessionSnapshot> {
        self.published.wait_until(timeout, predicate)
    }

    /// `wait_until` for a specific state.
    pub fn wait_for_state(&self, state: CaptureState, timeout: Duration) -> Option<SessionSnapshot> {
        self.wait_until(timeout, |session| session.state == state)
    }

    fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, CaptureError> {
        let (reply, response) = mpsc::channel();
        let stopped = || {
            CaptureError::new(
                CaptureErrorKind::InvalidState,
                "capture controller has stopped",
            )
        };
        self.tx
            .send(Message::Command(command(reply)))
            .map_err(|_| stopped())?;
        response.recv().map_err(|_| stopped())?
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        let _ = self.tx.send(Message::Command(Command::Shutdown));
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("capture controller thread panicked");
            }
        }
    }
}
