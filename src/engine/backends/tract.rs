#![cfg(feature = "backend-tract")]

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use super::movenet::{self, INPUT_SIZE};
use crate::engine::backend::{Acceleration, PoseBackend, PoseEstimator, RawEstimate};
use crate::frame::FrameView;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>>;

/// MoveNet on CPU through tract.
///
/// Loads a local ONNX file; no network I/O.
pub struct TractBackend {
    model_path: PathBuf,
}

impl TractBackend {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
        }
    }
}

impl PoseBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn acceleration(&self) -> Acceleration {
        Acceleration::Cpu
    }

    fn load(&self) -> Result<Box<dyn PoseEstimator>> {
        let model = tract_onnx::onnx()
            .model_for_path(&self.model_path)
            .with_context(|| {
                format!(
                    "failed to load ONNX model from {}",
                    self.model_path.display()
                )
            })?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, INPUT_SIZE, INPUT_SIZE, 3),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;
        Ok(Box::new(TractEstimator { model }))
    }
}

struct TractEstimator {
    model: Plan,
}

impl PoseEstimator for TractEstimator {
    fn estimate(&mut self, frame: FrameView<'_>) -> Result<RawEstimate> {
        let input = movenet::preprocess(frame)?;
        let input: Tensor =
            tract_ndarray::Array4::from_shape_vec((1, INPUT_SIZE, INPUT_SIZE, 3), input)
                .context("failed to shape MoveNet input")?
                .into_tensor();
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let values: Vec<f32> = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .iter()
            .copied()
            .collect();
        movenet::decode(&values, frame.width(), frame.height())
    }
}
