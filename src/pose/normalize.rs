use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::keypoint::Pose;

/// Resolution-independent keypoint handed to the caller and the analysis
/// service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedKeypoint {
    pub x: f32,
    pub y: f32,
    pub score: f32,
    pub name: String,
}

/// Divide pixel coordinates by the frame size.
///
/// Points slightly outside the frame are clamped into `[0, 1]`.
pub fn normalize_pose(pose: &Pose, width: u32, height: u32) -> Result<Vec<NormalizedKeypoint>> {
    if width == 0 || height == 0 {
        bail!("cannot normalize against an empty frame ({}x{})", width, height);
    }
    let (w, h) = (width as f32, height as f32);
    Ok(pose
        .iter()
        .map(|kp| NormalizedKeypoint {
            x: (kp.x() / w).clamp(0.0, 1.0),
            y: (kp.y() / h).clamp(0.0, 1.0),
            score: kp.confidence(),
            name: kp.label().to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::KeypointIndex;

    #[test]
    fn center_of_vga_frame_is_half() {
        let pose = Pose::from_fn(|index| match index {
            KeypointIndex::Nose => (320.0, 240.0, 0.8),
            _ => (0.0, 0.0, 0.0),
        });
        let out = normalize_pose(&pose, 640, 480).unwrap();
        assert_eq!(out.len(), 17);
        assert_eq!(
            out[0],
            NormalizedKeypoint {
                x: 0.5,
                y: 0.5,
                score: 0.8,
                name: "nose".to_string()
            }
        );
    }

    #[test]
    fn rescaling_recovers_pixels() {
        let (w, h) = (1280u32, 720u32);
        let pose = Pose::from_fn(|index| {
            let i = index as usize as f32;
            (37.0 * i + 3.5, 41.0 * i + 1.25, 0.6)
        });
        let out = normalize_pose(&pose, w, h).unwrap();
        for (kp, norm) in pose.iter().zip(&out) {
            assert!((norm.x * w as f32 - kp.x()).abs() < 1e-3);
            assert!((norm.y * h as f32 - kp.y()).abs() < 1e-3);
            assert_eq!(norm.name, kp.label());
        }
    }

    #[test]
    fn out_of_frame_points_are_clamped() {
        let pose = Pose::uniform(700.0, -5.0, 0.4);
        let out = normalize_pose(&pose, 640, 480).unwrap();
        assert!(out.iter().all(|kp| kp.x == 1.0 && kp.y == 0.0));
    }

    #[test]
    fn empty_frame_is_rejected() {
        assert!(normalize_pose(&Pose::default(), 0, 480).is_err());
    }

    #[test]
    fn serializes_with_boundary_field_names() {
        let kp = NormalizedKeypoint {
            x: 0.25,
            y: 0.75,
            score: 0.5,
            name: "left_hip".into(),
        };
        let json = serde_json::to_value(&kp).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"x": 0.25, "y": 0.75, "score": 0.5, "name": "left_hip"})
        );
    }
}
