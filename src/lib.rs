//! Pose Capture Kernel
//!
//! Captures a single, high-confidence body-pose snapshot from a live camera
//! feed and hands it off as resolution-independent keypoints.
//!
//! # Architecture
//!
//! A capture session runs a continuous per-frame inference loop. The operator
//! starts a countdown; after it, the first pose whose mean confidence clears
//! the gate becomes the measurement. Guarantees:
//!
//! 1. **One writer**: the session record is owned by the controller's event
//!    loop; renderer and gate never mutate it.
//! 2. **One session per camera**: a surface leases its device to one frame
//!    source at a time, and every exit path releases it.
//! 3. **Ephemeral frames**: inference borrows frames through `FrameView` and
//!    cannot retain them; only the accepted pose outlives its frame.
//! 4. **Normalize once**: pixel coordinates are divided by the negotiated
//!    frame size exactly once, at hand-off.
//!
//! # Module Structure
//!
//! - `pose`: keypoints, poses, coercion of backend output, normalization
//! - `frame`: transient RGB frames and the borrow-only inference view
//! - `surface`: camera streams (synthetic `stub://`, V4L2)
//! - `engine`: pose backends, GPU-first registry, engine handle
//! - `overlay`: keypoint and skeleton overlay
//! - `gate`: confidence scoring and acceptance
//! - `controller`: the capture state machine
//! - `assessment`, `analysis`: test catalog and analysis-service payload
//! - `config`, `ui`: ambient configuration and console output

pub mod analysis;
pub mod assessment;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod frame;
pub mod gate;
pub mod overlay;
pub mod pose;
pub mod surface;
pub mod ui;

pub use assessment::TestDescriptor;
pub use controller::{
    CaptureController, CaptureHandoff, CaptureObserver, CaptureState, CaptureTimings,
    SessionSnapshot,
};
pub use engine::{Acceleration, BackendRegistry, EngineHandle, Estimation};
pub use error::{CaptureError, CaptureErrorKind};
pub use frame::{Frame, FrameView};
pub use gate::{ConfidenceGate, Quality};
pub use pose::{Keypoint, KeypointIndex, NormalizedKeypoint, Pose};
pub use surface::{CaptureSurface, FrameSource, StreamConstraints};
