//! Keypoint and skeleton overlay. Presentation only: the renderer reads a
//! pose and writes pixels, nothing else.

mod canvas;
mod renderer;
pub mod skeleton;

pub use canvas::{Canvas, OverlaySurface};
pub use renderer::OverlayRenderer;
pub use skeleton::{SKELETON_CONNECTIONS, VISIBILITY_THRESHOLD};
