//! MoveNet single-pose pre- and post-processing shared by the ONNX backends.
//!
//! Input is a `[1, 192, 192, 3]` NHWC f32 tensor holding raw 0-255 RGB
//! values. Output is `[1, 1, 17, 3]` holding `(y, x, score)` per landmark,
//! with coordinates normalized to the input square.

use anyhow::{anyhow, Result};

use crate::engine::backend::RawEstimate;
use crate::frame::FrameView;
use crate::pose::{KeypointIndex, RawKeypoint};

pub const INPUT_SIZE: usize = 192;

/// Every landmark below this score means nobody is in frame.
pub const PERSON_SCORE_FLOOR: f32 = 0.1;

/// Resize the frame to the model square (nearest neighbour) and lay it out
/// as NHWC floats.
pub fn preprocess(frame: FrameView<'_>) -> Result<Vec<f32>> {
    let (width, height) = (frame.width() as usize, frame.height() as usize);
    if width == 0 || height == 0 {
        return Err(anyhow!("cannot preprocess an empty {}x{} frame", width, height));
    }
    let pixels = frame.pixels();
    if pixels.len() < width * height * 3 {
        return Err(anyhow!(
            "frame buffer holds {} bytes, {}x{} RGB needs {}",
            pixels.len(),
            width,
            height,
            width * height * 3
        ));
    }

    let mut input = Vec::with_capacity(INPUT_SIZE * INPUT_SIZE * 3);
    for ty in 0..INPUT_SIZE {
        let sy = (ty * height / INPUT_SIZE).min(height - 1);
        for tx in 0..INPUT_SIZE {
            let sx = (tx * width / INPUT_SIZE).min(width - 1);
            let idx = (sy * width + sx) * 3;
            input.extend(pixels[idx..idx + 3].iter().map(|&v| v as f32));
        }
    }
    Ok(input)
}

/// Turn the flattened `(y, x, score)` output into pixel-space keypoints.
pub fn decode(output: &[f32], frame_width: u32, frame_height: u32) -> Result<RawEstimate> {
    let expected = KeypointIndex::COUNT * 3;
    if output.len() < expected {
        return Err(anyhow!(
            "MoveNet output holds {} values, expected {}",
            output.len(),
            expected
        ));
    }

    let rows = output[..expected].chunks_exact(3);
    if rows.clone().all(|row| !(row[2] >= PERSON_SCORE_FLOOR)) {
        return Ok(RawEstimate::NoPerson);
    }

    let (w, h) = (frame_width as f32, frame_height as f32);
    let keypoints = KeypointIndex::ALL
        .iter()
        .zip(rows)
        .map(|(index, row)| RawKeypoint::labeled(index.label(), row[1] * w, row[0] * h, row[2]))
        .collect();
    Ok(RawEstimate::Keypoints(keypoints))
}
