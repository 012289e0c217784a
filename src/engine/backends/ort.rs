#![cfg(feature = "backend-ort")]

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use ndarray::Array4;
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use super::movenet::{self, INPUT_SIZE};
use crate::engine::backend::{Acceleration, PoseBackend, PoseEstimator, RawEstimate};
use crate::frame::FrameView;

/// MoveNet through ONNX Runtime.
///
/// The GPU variant registers the CUDA execution provider and refuses to load
/// without it, so the registry falls through to a CPU backend.
pub struct OrtBackend {
    model_path: PathBuf,
    acceleration: Acceleration,
}

impl OrtBackend {
    pub fn gpu<P: AsRef<Path>>(model_path: P) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            acceleration: Acceleration::Gpu,
        }
    }

    pub fn cpu<P: AsRef<Path>>(model_path: P) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            acceleration: Acceleration::Cpu,
        }
    }

    fn build_session(&self) -> Result<Session> {
        let mut builder =
            Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
        if self.acceleration == Acceleration::Gpu {
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .build()
                    .error_on_failure()])
                .context("CUDA execution provider unavailable")?;
        }
        builder
            .commit_from_file(&self.model_path)
            .with_context(|| {
                format!(
                    "failed to load ONNX model from {}",
                    self.model_path.display()
                )
            })
    }
}

impl PoseBackend for OrtBackend {
    fn name(&self) -> &'static str {
        match self.acceleration {
            Acceleration::Gpu => "ort-gpu",
            Acceleration::Cpu => "ort-cpu",
        }
    }

    fn acceleration(&self) -> Acceleration {
        self.acceleration
    }

    fn load(&self) -> Result<Box<dyn PoseEstimator>> {
        let session = self.build_session()?;
        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| anyhow!("model declares no inputs"))?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| anyhow!("model declares no outputs"))?;
        Ok(Box::new(OrtEstimator {
            session,
            input_name,
            output_name,
        }))
    }
}

struct OrtEstimator {
    session: Session,
    input_name: String,
    output_name: String,
}

impl PoseEstimator for OrtEstimator {
    fn estimate(&mut self, frame: FrameView<'_>) -> Result<RawEstimate> {
        let input = movenet::preprocess(frame)?;
        let input = Array4::from_shape_vec((1, INPUT_SIZE, INPUT_SIZE, 3), input)
            .context("failed to shape MoveNet input")?;
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .context("Inference failed")?;
        let output: ndarray::ArrayViewD<f32> = outputs[self.output_name.as_str()]
            .try_extract_array()
            .context("Failed to extract output tensor")?;
        let values: Vec<f32> = output.iter().copied().collect();
        movenet::decode(&values, frame.width(), frame.height())
    }
}
