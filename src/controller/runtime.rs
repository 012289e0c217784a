//! The controller's event loop.
//!
//! One thread owns the session record, the frame source and the engine
//! handle. Commands from the caller and results from the initialization
//! workers arrive on a single channel; timed activities come from the
//! `Scheduler`. Everything is processed one event at a time.

use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use super::activity::{Activity, Scheduler};
use super::observer::{CaptureHandoff, CaptureObserver};
use super::state::{CaptureSession, CaptureState};
use super::CaptureTimings;
use crate::assessment::TestDescriptor;
use crate::engine::{BackendRegistry, EngineHandle, Estimation};
use crate::error::{CaptureError, CaptureErrorKind};
use crate::gate::{ConfidenceGate, Quality};
use crate::overlay::{OverlayRenderer, OverlaySurface};
use crate::pose::{normalize_pose, NormalizedKeypoint};
use crate::surface::{CaptureSurface, FrameSource, StreamConstraints};

pub(crate) type Reply<T> = Sender<Result<T, CaptureError>>;

pub(crate) enum Command {
    Open(TestDescriptor, Reply<()>),
    StartCountdown(Reply<()>),
    Retry(Reply<()>),
    Complete(Reply<Vec<NormalizedKeypoint>>),
    HardReset(Reply<()>),
    Close(Sender<()>),
    Shutdown,
}

pub(crate) enum Message {
    Command(Command),
    SourceReady {
        generation: u64,
        result: Result<Box<dyn FrameSource>, CaptureError>,
    },
    EngineReady {
        generation: u64,
        result: Result<EngineHandle, CaptureError>,
    },
}

/// Latest published session record.
pub(crate) struct Published {
    session: Mutex<CaptureSession>,
    changed: Condvar,
}

impl Published {
    pub(crate) fn new() -> Self {
        Self {
            session: Mutex::new(CaptureSession::default()),
            changed: Condvar::new(),
        }
    }

    pub(crate) fn snapshot(&self) -> CaptureSession {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub(crate) fn wait_until(
        &self,
        timeout: Duration,
        mut predicate: impl FnMut(&CaptureSession) -> bool,
    ) -> Option<CaptureSession> {
        let guard = self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |session| !predicate(session))
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if predicate(&guard) {
            Some(guard.clone())
        } else {
            None
        }
    }

    fn publish(&self, session: &CaptureSession) {
        let mut guard = self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *guard != *session {
            *guard = session.clone();
            self.changed.notify_all();
        }
    }
}

pub(crate) struct Runtime {
    pub(crate) rx: Receiver<Message>,
    pub(crate) tx: Sender<Message>,
    pub(crate) surface: Arc<dyn CaptureSurface>,
    pub(crate) registry: Arc<BackendRegistry>,
    pub(crate) constraints: StreamConstraints,
    pub(crate) renderer: OverlayRenderer,
    pub(crate) overlay: Box<dyn OverlaySurface>,
    pub(crate) gate: ConfidenceGate,
    pub(crate) timings: CaptureTimings,
    pub(crate) observer: Box<dyn CaptureObserver>,
    pub(crate) published: Arc<Published>,
    pub(crate) session: CaptureSession,
    pub(crate) generation: u64,
    pub(crate) next_session_id: u64,
    pub(crate) scheduler: Scheduler,
    pub(crate) source: Option<Box<dyn FrameSource>>,
    pub(crate) engine: Option<EngineHandle>,
    pub(crate) source_failing_since: Option<Instant>,
}

enum Cycle {
    NoFrame,
    SourceFailed(anyhow::Error),
    Estimated(Result<Estimation, CaptureError>, (u32, u32)),
}

impl Runtime {
    pub(crate) fn run(mut self) {
        log::debug!("capture loop started");
        loop {
            let now = Instant::now();
            while let Some(activity) = self.scheduler.pop_due(now) {
                self.fire(activity);
                self.publish();
            }

            let message = match self.scheduler.next_deadline() {
                Some(deadline) => {
                    match self
                        .rx
                        .recv_timeout(deadline.saturating_duration_since(Instant::now()))
                    {
                        Ok(message) => message,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match self.rx.recv() {
                    Ok(message) => message,
                    Err(_) => break,
                },
            };

            let keep_running = match message {
                Message::Command(command) => self.handle_command(command),
                Message::SourceReady { generation, result } => {
                    self.on_source_ready(generation, result);
                    true
                }
                Message::EngineReady { generation, result } => {
                    self.on_engine_ready(generation, result);
                    true
                }
            };
            self.publish();
            if !keep_running {
                break;
            }
        }
        self.close_session();
        self.publish();
        log::debug!("capture loop stopped");
    }

    fn publish(&self) {
        self.published.publish(&self.session);
    }

    fn transition(&mut self, to: CaptureState) {
        let from = self.session.state;
        if !from.can_transition_to(to) {
            log::error!(
                "capture session {}: refusing transition {} -> {}",
                self.session.session_id,
                from,
                to
            );
            return;
        }
        self.session.state = to;
        log::info!(
            "capture session {}: {} -> {}",
            self.session.session_id,
            from,
            to
        );
        self.observer.on_transition(from, to);
        self.publish();
    }

    fn invalid(&self, action: &str) -> CaptureError {
        CaptureError::new(
            CaptureErrorKind::InvalidState,
            format!("cannot {} while {}", action, self.session.state),
        )
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Open(test, reply) => {
                let result = self.open(test);
                let _ = reply.send(result);
            }
            Command::StartCountdown(reply) => {
                let result = self.start_countdown();
                let _ = reply.send(result);
            }
            Command::Retry(reply) => {
                let result = self.retry();
                let _ = reply.send(result);
            }
            Command::Complete(reply) => {
                let result = self.complete();
                let _ = reply.send(result);
            }
            Command::HardReset(reply) => {
                let result = self.hard_reset();
                let _ = reply.send(result);
            }
            Command::Close(reply) => {
                if self.session.state.is_open() {
                    self.close_session();
                    self.observer.on_close();
                }
                let _ = reply.send(());
            }
            Command::Shutdown => return false,
        }
        true
    }

    fn open(&mut self, test: TestDescriptor) -> Result<(), CaptureError> {
        if self.session.state.is_open() {
            return Err(self.invalid("open a new session"));
        }
        self.begin_session(test);
        Ok(())
    }

    fn start_countdown(&mut self) -> Result<(), CaptureError> {
        if self.session.state != CaptureState::Detecting {
            return Err(self.invalid("start the countdown"));
        }
        let ticks = self.timings.countdown_ticks;
        self.session.countdown_remaining = Some(ticks);
        self.session.last_error = None;
        self.transition(CaptureState::CountdownRunning);
        self.observer.on_countdown(ticks);
        if ticks == 0 {
            self.enter_gated_capture();
        } else {
            self.scheduler
                .schedule_in(Activity::CountdownTick, self.timings.countdown_interval);
        }
        Ok(())
    }

    fn retry(&mut self) -> Result<(), CaptureError> {
        if self.session.state != CaptureState::Captured {
            return Err(self.invalid("retry"));
        }
        self.session.captured_pose = None;
        self.session.last_confidence = None;
        self.transition(CaptureState::Detecting);
        self.scheduler.schedule_in(Activity::FrameTick, Duration::ZERO);
        Ok(())
    }

    fn complete(&mut self) -> Result<Vec<NormalizedKeypoint>, CaptureError> {
        if self.session.state != CaptureState::Captured {
            return Err(self.invalid("complete"));
        }
        let (Some(pose), Some((width, height))) =
            (self.session.captured_pose.as_ref(), self.session.frame_size)
        else {
            return Err(self.invalid("complete without a captured pose"));
        };
        let keypoints = normalize_pose(pose, width, height).map_err(|err| {
            CaptureError::from_anyhow(CaptureErrorKind::InvalidState, &err)
        })?;

        let handoff = CaptureHandoff {
            session_id: self.session.session_id,
            test_id: self.session.test_id().unwrap_or_default().to_string(),
            frame_width: width,
            frame_height: height,
            keypoints: keypoints.clone(),
        };
        log::info!(
            "capture session {}: handing off {} keypoints for {}",
            handoff.session_id,
            handoff.keypoints.len(),
            handoff.test_id
        );
        self.observer.on_complete(&handoff);
        self.close_session();
        Ok(keypoints)
    }

    fn hard_reset(&mut self) -> Result<(), CaptureError> {
        if !self.session.state.is_open() {
            return Err(self.invalid("reset"));
        }
        let Some(test) = self.session.test.clone() else {
            return Err(self.invalid("reset without a test"));
        };
        log::warn!(
            "capture session {}: hard reset",
            self.session.session_id
        );
        self.scheduler.cancel_all();
        self.release_resources();
        self.begin_session(test);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Initialization
    // ------------------------------------------------------------------

    /// Fresh record for `test`, then concurrent surface and engine setup.
    fn begin_session(&mut self, test: TestDescriptor) {
        self.generation += 1;
        self.next_session_id += 1;
        let from = self.session.state;
        self.session = CaptureSession::new(self.next_session_id, Some(test));
        self.session.state = from;
        self.transition(CaptureState::Initializing);

        self.scheduler
            .schedule_in(Activity::InitTimeout, self.timings.init_timeout);
        if let Err(err) = self.spawn_workers() {
            self.fail(err);
        }
    }

    fn spawn_workers(&self) -> Result<(), CaptureError> {
        let generation = self.generation;
        let spawn_error = |err: std::io::Error| {
            CaptureError::new(
                CaptureErrorKind::DeviceUnavailable,
                format!("spawn initialization worker: {}", err),
            )
        };

        let surface = self.surface.clone();
        let constraints = self.constraints.clone();
        let camera_ready = self.timings.camera_ready;
        let tx = self.tx.clone();
        std::thread::Builder::new()
            .name("capture-init-surface".to_string())
            .spawn(move || {
                let result = surface.open(&constraints).and_then(|mut source| {
                    match source.wait_ready(camera_ready) {
                        Ok(()) => Ok(source),
                        Err(err) => {
                            source.close();
                            Err(err)
                        }
                    }
                });
                let _ = tx.send(Message::SourceReady { generation, result });
            })
            .map_err(spawn_error)?;

        let registry = self.registry.clone();
        let tx = self.tx.clone();
        std::thread::Builder::new()
            .name("capture-init-engine".to_string())
            .spawn(move || {
                let result = registry.initialize();
                let _ = tx.send(Message::EngineReady { generation, result });
            })
            .map_err(spawn_error)?;
        Ok(())
    }

    fn accepts_init_result(&self, generation: u64) -> bool {
        generation == self.generation && self.session.state == CaptureState::Initializing
    }

    fn on_source_ready(
        &mut self,
        generation: u64,
        result: Result<Box<dyn FrameSource>, CaptureError>,
    ) {
        if !self.accepts_init_result(generation) {
            if let Ok(mut source) = result {
                log::info!("releasing frame source from superseded session");
                source.close();
            }
            return;
        }
        match result {
            Ok(source) => {
                self.session.frame_size = Some(source.resolution());
                self.source = Some(source);
                self.enter_detecting_when_ready();
            }
            Err(err) => self.fail(err),
        }
    }

    fn on_engine_ready(&mut self, generation: u64, result: Result<EngineHandle, CaptureError>) {
        if !self.accepts_init_result(generation) {
            if let Ok(engine) = result {
                log::info!("releasing pose engine from superseded session");
                engine.release();
            }
            return;
        }
        match result {
            Ok(engine) => {
                self.session.backend = Some(engine.backend_name());
                self.engine = Some(engine);
                self.enter_detecting_when_ready();
            }
            Err(err) => self.fail(err),
        }
    }

    fn enter_detecting_when_ready(&mut self) {
        if self.source.is_none() || self.engine.is_none() {
            return;
        }
        self.scheduler.cancel(Activity::InitTimeout);
        self.transition(CaptureState::Detecting);
        self.scheduler.schedule_in(Activity::FrameTick, Duration::ZERO);
    }

    // ------------------------------------------------------------------
    // Activities
    // ------------------------------------------------------------------

    fn fire(&mut self, activity: Activity) {
        match activity {
            Activity::FrameTick => self.detection_cycle(),
            Activity::CountdownTick => self.countdown_tick(),
            Activity::CaptureTimeout => self.capture_timeout(),
            Activity::InitTimeout => self.init_timeout(),
        }
    }

    fn detection_cycle(&mut self) {
        if !self.session.state.is_detecting() {
            return;
        }
        let cycle = match (self.source.as_mut(), self.engine.as_mut()) {
            (Some(source), Some(engine)) => match source.latest_frame() {
                Ok(Some(frame)) => Cycle::Estimated(
                    engine.estimate(frame.view()),
                    (frame.width(), frame.height()),
                ),
                Ok(None) => Cycle::NoFrame,
                Err(err) => Cycle::SourceFailed(err),
            },
            _ => return,
        };

        match cycle {
            Cycle::NoFrame => {}
            Cycle::SourceFailed(err) => {
                let since = *self.source_failing_since.get_or_insert_with(Instant::now);
                log::warn!("frame read failed: {:#}", err);
                if since.elapsed() >= self.timings.camera_ready {
                    self.fail(CaptureError::new(
                        CaptureErrorKind::DeviceUnavailable,
                        format!("camera stopped delivering frames: {:#}", err),
                    ));
                    return;
                }
            }
            Cycle::Estimated(Err(err), _) => {
                self.source_failing_since = None;
                self.session.transient_failures += 1;
                log::warn!("{}", err);
            }
            Cycle::Estimated(Ok(estimation), frame_size) => {
                self.source_failing_since = None;
                if self.process_estimation(estimation, frame_size) {
                    return;
                }
            }
        }

        self.scheduler
            .schedule_in(Activity::FrameTick, self.timings.frame_interval);
    }

    /// Score, render and gate one estimate. Returns true when the pose was
    /// captured and the loop must stop.
    fn process_estimation(&mut self, estimation: Estimation, frame_size: (u32, u32)) -> bool {
        self.session.detection_ticks += 1;
        let score = estimation.pose().map(|pose| self.gate.score(pose)).unwrap_or(0.0);
        self.session.last_confidence = Some(score);
        self.observer
            .on_quality(score, Quality::assess(score, self.gate.threshold()));

        if let Err(err) = self
            .renderer
            .render(estimation.pose(), frame_size, self.overlay.as_mut())
        {
            log::warn!("overlay render failed: {:#}", err);
        }

        if self.session.state != CaptureState::AwaitingGatedCapture {
            return false;
        }
        let Estimation::Pose(pose) = estimation else {
            return false;
        };
        if !self.gate.accept(&pose) {
            return false;
        }

        log::info!(
            "capture session {}: pose accepted at confidence {:.3}",
            self.session.session_id,
            score
        );
        self.session.captured_pose = Some(pose);
        self.scheduler.cancel(Activity::CaptureTimeout);
        self.scheduler.cancel(Activity::FrameTick);
        self.transition(CaptureState::Captured);
        true
    }

    fn countdown_tick(&mut self) {
        if self.session.state != CaptureState::CountdownRunning {
            return;
        }
        let remaining = self
            .session
            .countdown_remaining
            .unwrap_or(1)
            .saturating_sub(1);
        self.session.countdown_remaining = Some(remaining);
        self.observer.on_countdown(remaining);
        if remaining == 0 {
            self.enter_gated_capture();
        } else {
            self.scheduler
                .schedule_in(Activity::CountdownTick, self.timings.countdown_interval);
        }
    }

    fn enter_gated_capture(&mut self) {
        self.session.countdown_remaining = None;
        self.transition(CaptureState::AwaitingGatedCapture);
        self.scheduler
            .schedule_in(Activity::CaptureTimeout, self.timings.capture_timeout);
    }

    fn capture_timeout(&mut self) {
        if self.session.state != CaptureState::AwaitingGatedCapture {
            return;
        }
        let err = CaptureError::new(
            CaptureErrorKind::CaptureTimeout,
            format!(
                "no pose above {:.2} within {:.1}s",
                self.gate.threshold(),
                self.timings.capture_timeout.as_secs_f32()
            ),
        );
        self.fail(err);
    }

    fn init_timeout(&mut self) {
        if self.session.state != CaptureState::Initializing {
            return;
        }
        self.fail(CaptureError::new(
            CaptureErrorKind::InitializationTimeout,
            format!(
                "camera and pose model not ready within {:.1}s",
                self.timings.init_timeout.as_secs_f32()
            ),
        ));
    }

    // ------------------------------------------------------------------
    // Errors and teardown
    // ------------------------------------------------------------------

    /// Enter `Error`. Fatal kinds tear the session down; a capture timeout
    /// drops back to detection with camera and engine kept.
    fn fail(&mut self, err: CaptureError) {
        log::warn!("capture session {}: {}", self.session.session_id, err);
        self.session.last_error = Some(err.clone());
        self.session.countdown_remaining = None;
        self.observer.on_error(&err);
        self.transition(CaptureState::Error);

        if err.is_fatal() {
            self.scheduler.cancel_all();
            self.release_resources();
            return;
        }
        self.transition(CaptureState::Detecting);
        if !self.scheduler.is_pending(Activity::FrameTick) {
            self.scheduler.schedule_in(Activity::FrameTick, Duration::ZERO);
        }
    }

    fn release_resources(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
        }
        if let Some(engine) = self.engine.take() {
            engine.release();
        }
        self.source_failing_since = None;
        if let Err(err) = self
            .overlay
            .clear()
            .and_then(|()| self.overlay.present())
        {
            log::debug!("overlay clear failed: {:#}", err);
        }
    }

    /// Stop everything and leave the record `Closed`. Late init results for
    /// this session are released when they arrive.
    fn close_session(&mut self) {
        if !self.session.state.is_open() {
            return;
        }
        self.scheduler.cancel_all();
        self.release_resources();
        self.generation += 1;
        self.session.countdown_remaining = None;
        self.transition(CaptureState::Closed);
    }
}
