use std::sync::Arc;

use crate::error::{CaptureError, CaptureErrorKind};

use super::backend::{Acceleration, PoseBackend};
use super::handle::EngineHandle;

/// Ordered set of pose backends with graceful degradation.
///
/// `initialize` tries GPU backends first, then CPU backends, each class in
/// registration order, and returns the first one that loads.
pub struct BackendRegistry {
    backends: Vec<Arc<dyn PoseBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
        }
    }

    pub fn register<B: PoseBackend + 'static>(&mut self, backend: B) {
        self.backends.push(Arc::new(backend));
    }

    /// Builder-style `register`.
    pub fn with<B: PoseBackend + 'static>(mut self, backend: B) -> Self {
        self.register(backend);
        self
    }

    /// Registered backend names.
    pub fn list(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Backends in the order `initialize` tries them.
    pub fn preference_order(&self) -> Vec<Arc<dyn PoseBackend>> {
        let mut ordered = self.backends.clone();
        // Stable sort keeps registration order within a class.
        ordered.sort_by_key(|b| b.acceleration());
        ordered
    }

    /// Load the most preferred backend that works.
    pub fn initialize(&self) -> Result<EngineHandle, CaptureError> {
        let mut failures = Vec::new();
        for backend in self.preference_order() {
            match backend.load() {
                Ok(mut estimator) => {
                    if let Err(err) = estimator.warm_up() {
                        log::warn!("backend {} failed warm-up: {:#}", backend.name(), err);
                        failures.push(format!("{}: warm-up: {:#}", backend.name(), err));
                        continue;
                    }
                    if !failures.is_empty() {
                        log::info!(
                            "pose engine degraded to {} ({:?}) after {} failed backend(s)",
                            backend.name(),
                            backend.acceleration(),
                            failures.len()
                        );
                    } else {
                        log::info!(
                            "pose engine loaded on {} ({:?})",
                            backend.name(),
                            backend.acceleration()
                        );
                    }
                    return Ok(EngineHandle::new(
                        backend.name(),
                        backend.acceleration(),
                        estimator,
                    ));
                }
                Err(err) => {
                    log::warn!(
                        "backend {} ({:?}) failed to load: {:#}",
                        backend.name(),
                        backend.acceleration(),
                        err
                    );
                    failures.push(format!("{}: {:#}", backend.name(), err));
                }
            }
        }

        let message = if failures.is_empty() {
            "no pose backend registered".to_string()
        } else {
            format!("no pose backend could be loaded ({})", failures.join("; "))
        };
        Err(CaptureError::new(CaptureErrorKind::ModelLoadFailed, message))
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backends::StubBackend;

    #[test]
    fn gpu_backend_is_preferred() {
        let registry = BackendRegistry::new()
            .with(StubBackend::named("stub-cpu", Acceleration::Cpu))
            .with(StubBackend::named("stub-gpu", Acceleration::Gpu));
        let handle = registry.initialize().unwrap();
        assert_eq!(handle.backend_name(), "stub-gpu");
        assert_eq!(handle.acceleration(), Acceleration::Gpu);
    }

    #[test]
    fn falls_back_to_cpu_when_gpu_fails() {
        let registry = BackendRegistry::new()
            .with(StubBackend::named("stub-gpu", Acceleration::Gpu).failing_load())
            .with(StubBackend::named("stub-cpu", Acceleration::Cpu));
        let handle = registry.initialize().unwrap();
        assert_eq!(handle.backend_name(), "stub-cpu");
        assert_eq!(handle.acceleration(), Acceleration::Cpu);
    }

    #[test]
    fn registration_order_breaks_ties() {
        let registry = BackendRegistry::new()
            .with(StubBackend::named("first", Acceleration::Cpu))
            .with(StubBackend::named("second", Acceleration::Cpu));
        let names: Vec<_> = registry
            .preference_order()
            .iter()
            .map(|b| b.name())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn all_failures_are_model_load_failed() {
        let registry = BackendRegistry::new()
            .with(StubBackend::named("stub-gpu", Acceleration::Gpu).failing_load())
            .with(StubBackend::named("stub-cpu", Acceleration::Cpu).failing_load());
        let err = registry.initialize().err().unwrap();
        assert_eq!(err.kind, CaptureErrorKind::ModelLoadFailed);
        assert!(err.message.contains("stub-gpu"));
        assert!(err.message.contains("stub-cpu"));
    }

    #[test]
    fn empty_registry_cannot_initialize() {
        let err = BackendRegistry::new().initialize().err().unwrap();
        assert_eq!(err.kind, CaptureErrorKind::ModelLoadFailed);
    }
}
