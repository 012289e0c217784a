pub mod movenet;
pub mod stub;

#[cfg(feature = "backend-ort")]
pub mod ort;
#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::{standing_figure, StubBackend, StubContext, StubOutput};

#[cfg(feature = "backend-ort")]
pub use self::ort::OrtBackend;
#[cfg(feature = "backend-tract")]
pub use self::tract::TractBackend;
