use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::controller::CaptureTimings;
use crate::gate::ConfidenceGate;
use crate::overlay::OverlayRenderer;
use crate::surface::{Facing, StreamConstraints};

const DEFAULT_CAMERA_URI: &str = "stub://front_camera";
const DEFAULT_MODEL_PATH: &str = "models/movenet_singlepose_lightning.onnx";
const DEFAULT_BACKENDS: [&str; 3] = ["ort-gpu", "ort-cpu", "tract"];
const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 30;
const MAX_KEYPOINT_RADIUS: i32 = 64;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CaptureConfigFile {
    camera: Option<CameraConfigFile>,
    model: Option<ModelConfigFile>,
    gate: Option<GateConfigFile>,
    timings: Option<TimingsConfigFile>,
    overlay: Option<OverlayConfigFile>,
    analysis: Option<AnalysisConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    uri: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    max_width: Option<u32>,
    max_height: Option<u32>,
    facing: Option<Facing>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    backends: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct GateConfigFile {
    threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TimingsConfigFile {
    camera_ready_ms: Option<u64>,
    init_timeout_ms: Option<u64>,
    capture_timeout_ms: Option<u64>,
    countdown_ticks: Option<u32>,
    countdown_interval_ms: Option<u64>,
    frame_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OverlayConfigFile {
    visibility_threshold: Option<f32>,
    keypoint_radius: Option<i32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AnalysisConfigFile {
    url: Option<String>,
    session_id: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub camera_uri: String,
    pub constraints: StreamConstraints,
    pub model_path: PathBuf,
    pub backends: Vec<String>,
    pub threshold: f32,
    pub timings: CaptureTimings,
    pub renderer: OverlayRenderer,
    pub analysis: AnalysisSettings,
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisSettings {
    pub url: Option<String>,
    /// Conversation id on the analysis service.
    pub session_id: Option<String>,
    pub timeout: Duration,
}

impl CaptureConfig {
    /// Defaults, then the file named by `POSE_CAPTURE_CONFIG`, then
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("POSE_CAPTURE_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CaptureConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let defaults = StreamConstraints::default();
        let constraints = StreamConstraints {
            width: camera.width.unwrap_or(defaults.width),
            height: camera.height.unwrap_or(defaults.height),
            max_width: camera.max_width.unwrap_or(defaults.max_width),
            max_height: camera.max_height.unwrap_or(defaults.max_height),
            facing: camera.facing.unwrap_or(defaults.facing),
            audio: false,
        };

        let model = file.model.unwrap_or_default();
        let timings = file.timings.unwrap_or_default();
        let base = CaptureTimings::default();
        let millis = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_millis).unwrap_or(fallback)
        };
        let overlay = file.overlay.unwrap_or_default();
        let renderer = OverlayRenderer::default();
        let analysis = file.analysis.unwrap_or_default();

        Self {
            camera_uri: camera
                .uri
                .unwrap_or_else(|| DEFAULT_CAMERA_URI.to_string()),
            constraints,
            model_path: model
                .path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            backends: model
                .backends
                .unwrap_or_else(|| DEFAULT_BACKENDS.iter().map(|s| s.to_string()).collect()),
            threshold: file
                .gate
                .and_then(|gate| gate.threshold)
                .unwrap_or(crate::gate::DEFAULT_THRESHOLD),
            timings: CaptureTimings {
                camera_ready: millis(timings.camera_ready_ms, base.camera_ready),
                init_timeout: millis(timings.init_timeout_ms, base.init_timeout),
                capture_timeout: millis(timings.capture_timeout_ms, base.capture_timeout),
                countdown_ticks: timings.countdown_ticks.unwrap_or(base.countdown_ticks),
                countdown_interval: millis(timings.countdown_interval_ms, base.countdown_interval),
                frame_interval: millis(timings.frame_interval_ms, base.frame_interval),
            },
            renderer: OverlayRenderer {
                visibility_threshold: overlay
                    .visibility_threshold
                    .unwrap_or(renderer.visibility_threshold),
                keypoint_radius: overlay.keypoint_radius.unwrap_or(renderer.keypoint_radius),
                ..renderer
            },
            analysis: AnalysisSettings {
                url: analysis.url,
                session_id: analysis.session_id,
                timeout: Duration::from_secs(
                    analysis
                        .timeout_secs
                        .unwrap_or(DEFAULT_ANALYSIS_TIMEOUT_SECS),
                ),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(uri) = std::env::var("POSE_CAPTURE_CAMERA") {
            if !uri.trim().is_empty() {
                self.camera_uri = uri;
            }
        }
        if let Ok(path) = std::env::var("POSE_CAPTURE_MODEL") {
            if !path.trim().is_empty() {
                self.model_path = PathBuf::from(path);
            }
        }
        if let Ok(backends) = std::env::var("POSE_CAPTURE_BACKENDS") {
            let parsed = split_csv(&backends);
            if !parsed.is_empty() {
                self.backends = parsed;
            }
        }
        if let Ok(threshold) = std::env::var("POSE_CAPTURE_THRESHOLD") {
            self.threshold = threshold.trim().parse().map_err(|_| {
                anyhow!("POSE_CAPTURE_THRESHOLD must be a number between 0 and 1")
            })?;
        }
        if let Ok(url) = std::env::var("POSE_CAPTURE_ANALYSIS_URL") {
            if !url.trim().is_empty() {
                self.analysis.url = Some(url);
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.gate()?;
        if !(0.0..=1.0).contains(&self.renderer.visibility_threshold) {
            return Err(anyhow!("overlay visibility_threshold must be within [0, 1]"));
        }
        if !(0..=MAX_KEYPOINT_RADIUS).contains(&self.renderer.keypoint_radius) {
            return Err(anyhow!(
                "overlay keypoint_radius must be within [0, {}]",
                MAX_KEYPOINT_RADIUS
            ));
        }
        let c = &self.constraints;
        if c.width == 0 || c.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        if c.width > c.max_width || c.height > c.max_height {
            return Err(anyhow!(
                "camera resolution {}x{} exceeds the {}x{} cap",
                c.width,
                c.height,
                c.max_width,
                c.max_height
            ));
        }
        let t = &self.timings;
        for (name, value) in [
            ("camera_ready_ms", t.camera_ready),
            ("init_timeout_ms", t.init_timeout),
            ("capture_timeout_ms", t.capture_timeout),
            ("countdown_interval_ms", t.countdown_interval),
        ] {
            if value.is_zero() {
                return Err(anyhow!("timings.{} must be greater than zero", name));
            }
        }
        self.backends = self
            .backends
            .iter()
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect();
        if self.backends.is_empty() {
            return Err(anyhow!("at least one pose backend must be configured"));
        }
        Ok(())
    }

    pub fn gate(&self) -> Result<ConfidenceGate> {
        ConfidenceGate::new(self.threshold)
    }
}

/// TOML unless the file ends in `.json`.
fn read_config_file(path: &Path) -> Result<CaptureConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = CaptureConfig::from_file(CaptureConfigFile::default());
        assert_eq!(cfg.camera_uri, DEFAULT_CAMERA_URI);
        assert_eq!(cfg.threshold, 0.35);
        assert_eq!(cfg.timings, CaptureTimings::default());
        assert_eq!(cfg.constraints, StreamConstraints::default());
        assert_eq!(cfg.backends, vec!["ort-gpu", "ort-cpu", "tract"]);
    }

    #[test]
    fn toml_sections_parse() {
        let file: CaptureConfigFile = toml::from_str(
            r#"
            [camera]
            uri = "/dev/video2"
            facing = "environment"

            [timings]
            capture_timeout_ms = 5000
            "#,
        )
        .unwrap();
        let cfg = CaptureConfig::from_file(file);
        assert_eq!(cfg.camera_uri, "/dev/video2");
        assert_eq!(cfg.constraints.facing, Facing::Environment);
        assert_eq!(cfg.timings.capture_timeout, Duration::from_millis(5000));
        assert_eq!(cfg.timings.init_timeout, Duration::from_secs(30));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let parsed: Result<CaptureConfigFile, _> = toml::from_str("[gate]\nthreshhold = 0.5\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn validation_rejects_resolution_above_cap() {
        let mut cfg = CaptureConfig::from_file(CaptureConfigFile::default());
        cfg.constraints.width = 1920;
        cfg.constraints.height = 1080;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_bounds_keypoint_radius() {
        let mut cfg = CaptureConfig::from_file(CaptureConfigFile::default());
        cfg.renderer.keypoint_radius = i32::MAX;
        assert!(cfg.validate().is_err());
        cfg.renderer.keypoint_radius = -1;
        assert!(cfg.validate().is_err());
        cfg.renderer.keypoint_radius = MAX_KEYPOINT_RADIUS;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validation_normalizes_backend_names() {
        let mut cfg = CaptureConfig::from_file(CaptureConfigFile::default());
        cfg.backends = vec![" Stub ".to_string(), "".to_string()];
        cfg.validate().unwrap();
        assert_eq!(cfg.backends, vec!["stub"]);
    }
}
