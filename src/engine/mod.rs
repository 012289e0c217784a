//! Inference engine adapter.
//!
//! Backends register with a `BackendRegistry`; `initialize` loads the most
//! preferred one (GPU before CPU) and returns an `EngineHandle` that turns
//! frames into `Estimation`s.

mod backend;
pub mod backends;
mod handle;
mod registry;

use std::path::Path;

pub use backend::{Acceleration, PoseBackend, PoseEstimator, RawEstimate};
pub use handle::{EngineHandle, Estimation};
pub use registry::BackendRegistry;

/// Build a registry from configured backend names.
///
/// Known names: `stub`, `tract`, `ort-gpu`, `ort-cpu`. Names whose backend
/// was not compiled in are skipped with a warning; unknown names are an
/// error.
pub fn registry_from_names<S: AsRef<str>>(
    names: &[S],
    model_path: &Path,
) -> anyhow::Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    for name in names {
        match name.as_ref().trim() {
            "stub" => registry.register(backends::StubBackend::new(Acceleration::Cpu)),
            "tract" => {
                #[cfg(feature = "backend-tract")]
                registry.register(backends::TractBackend::new(model_path));
                #[cfg(not(feature = "backend-tract"))]
                log::warn!("backend tract requested but feature backend-tract is disabled");
            }
            "ort-gpu" => {
                #[cfg(feature = "backend-ort")]
                registry.register(backends::OrtBackend::gpu(model_path));
                #[cfg(not(feature = "backend-ort"))]
                log::warn!("backend ort-gpu requested but feature backend-ort is disabled");
            }
            "ort-cpu" => {
                #[cfg(feature = "backend-ort")]
                registry.register(backends::OrtBackend::cpu(model_path));
                #[cfg(not(feature = "backend-ort"))]
                log::warn!("backend ort-cpu requested but feature backend-ort is disabled");
            }
            other => anyhow::bail!("unknown pose backend {:?}", other),
        }
    }
    let _ = model_path;
    if registry.is_empty() {
        anyhow::bail!("none of the configured pose backends is available in this build");
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_name_builds_registry() {
        let registry = registry_from_names(&["stub"], Path::new("unused.onnx")).unwrap();
        assert_eq!(registry.list(), vec!["stub"]);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let err = registry_from_names(&["cuda-magic"], Path::new("m.onnx"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("cuda-magic"));
    }

    #[test]
    fn empty_list_is_rejected() {
        let names: [&str; 0] = [];
        assert!(registry_from_names(&names, Path::new("m.onnx")).is_err());
    }
}
