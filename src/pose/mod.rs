//! Keypoint and pose types shared by every component.

pub mod coerce;
pub mod keypoint;
pub mod normalize;

pub use coerce::{coerce_pose, RawKeypoint};
pub use keypoint::{Keypoint, KeypointIndex, Pose};
pub use normalize::{normalize_pose, NormalizedKeypoint};
