//! Coercion of backend keypoints into the fixed 17-landmark `Pose`.
//!
//! Backends may label their keypoints, order them differently, omit some or
//! report scores outside `[0, 1]`. Everything past the engine adapter only
//! ever sees a well-formed `Pose`.

use anyhow::{anyhow, bail, Result};

use super::keypoint::{Keypoint, KeypointIndex, Pose};

/// Keypoint as produced by a backend, before validation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawKeypoint {
    pub label: Option<String>,
    pub x: f32,
    pub y: f32,
    pub score: Option<f32>,
}

impl RawKeypoint {
    pub fn labeled(label: impl Into<String>, x: f32, y: f32, score: f32) -> Self {
        Self {
            label: Some(label.into()),
            x,
            y,
            score: Some(score),
        }
    }

    pub fn positional(x: f32, y: f32, score: f32) -> Self {
        Self {
            label: None,
            x,
            y,
            score: Some(score),
        }
    }

    fn confidence(&self) -> f32 {
        match self.score {
            Some(score) if score.is_finite() => score.clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}

/// Validate and reorder a backend keypoint set.
///
/// Labeled sets are remapped by label; missing landmarks become
/// zero-confidence and unknown labels are skipped. Unlabeled sets must hold
/// exactly 17 entries in canonical order. Mixing both styles is rejected.
pub fn coerce_pose(raw: &[RawKeypoint]) -> Result<Pose> {
    if raw.is_empty() {
        bail!("backend produced an empty keypoint set");
    }
    if let Some(bad) = raw.iter().find(|kp| !kp.x.is_finite() || !kp.y.is_finite()) {
        bail!(
            "non-finite keypoint coordinate ({}, {}) for {}",
            bad.x,
            bad.y,
            bad.label.as_deref().unwrap_or("<unlabeled>")
        );
    }

    let labeled = raw.iter().filter(|kp| kp.label.is_some()).count();
    if labeled == 0 {
        return coerce_positional(raw);
    }
    if labeled != raw.len() {
        bail!(
            "keypoint set mixes labeled and unlabeled entries ({} of {} labeled)",
            labeled,
            raw.len()
        );
    }
    coerce_labeled(raw)
}

fn coerce_positional(raw: &[RawKeypoint]) -> Result<Pose> {
    if raw.len() != KeypointIndex::COUNT {
        return Err(anyhow!(
            "unlabeled keypoint set must have {} entries, got {}",
            KeypointIndex::COUNT,
            raw.len()
        ));
    }
    Ok(Pose::from_fn(|index| {
        let kp = &raw[index as usize];
        (kp.x, kp.y, kp.confidence())
    }))
}

fn coerce_labeled(raw: &[RawKeypoint]) -> Result<Pose> {
    let mut slots: [Option<Keypoint>; KeypointIndex::COUNT] = [None; KeypointIndex::COUNT];
    let mut matched = 0usize;

    for kp in raw {
        let label = kp.label.as_deref().unwrap_or_default();
        let Some(index) = KeypointIndex::from_label(label) else {
            log::debug!("ignoring unknown keypoint label '{}'", label);
            continue;
        };
        if slots[index as usize].is_none() {
            matched += 1;
        }
        slots[index as usize] = Some(Keypoint::new(index, kp.x, kp.y, kp.confidence()));
    }

    if matched == 0 {
        bail!("no keypoint label matched the 17-landmark layout");
    }

    Ok(Pose::from_fn(|index| match slots[index as usize] {
        Some(kp) => (kp.x(), kp.y(), kp.confidence()),
        None => (0.0, 0.0, 0.0),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_set_keeps_order() {
        let raw: Vec<_> = (0..17)
            .map(|i| RawKeypoint::positional(i as f32, 2.0 * i as f32, 0.5))
            .collect();
        let pose = coerce_pose(&raw).unwrap();
        assert_eq!(pose.get(KeypointIndex::LeftHip).x(), 11.0);
        assert_eq!(pose.get(KeypointIndex::LeftHip).y(), 22.0);
    }

    #[test]
    fn positional_set_requires_seventeen() {
        let raw = vec![RawKeypoint::positional(1.0, 1.0, 0.9); 16];
        assert!(coerce_pose(&raw).is_err());
    }

    #[test]
    fn labeled_set_is_remapped() {
        let raw = vec![
            RawKeypoint::labeled("rightAnkle", 10.0, 400.0, 0.8),
            RawKeypoint::labeled("nose", 320.0, 40.0, 0.9),
            RawKeypoint::labeled("halo", 1.0, 1.0, 1.0),
        ];
        let pose = coerce_pose(&raw).unwrap();
        assert_eq!(pose.get(KeypointIndex::Nose).x(), 320.0);
        assert_eq!(pose.get(KeypointIndex::RightAnkle).y(), 400.0);
        assert_eq!(pose.get(KeypointIndex::LeftEye).confidence(), 0.0);
    }

    #[test]
    fn scores_are_sanitized() {
        let raw = vec![
            RawKeypoint::labeled("nose", 1.0, 1.0, 3.0),
            RawKeypoint {
                label: Some("left_eye".into()),
                x: 1.0,
                y: 1.0,
                score: Some(f32::NAN),
            },
            RawKeypoint {
                label: Some("right_eye".into()),
                x: 1.0,
                y: 1.0,
                score: None,
            },
        ];
        let pose = coerce_pose(&raw).unwrap();
        assert_eq!(pose.get(KeypointIndex::Nose).confidence(), 1.0);
        assert_eq!(pose.get(KeypointIndex::LeftEye).confidence(), 0.0);
        assert_eq!(pose.get(KeypointIndex::RightEye).confidence(), 0.0);
    }

    #[test]
    fn rejects_non_finite_coordinates_and_mixed_sets() {
        let raw = vec![RawKeypoint::labeled("nose", f32::INFINITY, 1.0, 0.9)];
        assert!(coerce_pose(&raw).is_err());

        let mixed = vec![
            RawKeypoint::labeled("nose", 1.0, 1.0, 0.9),
            RawKeypoint::positional(1.0, 1.0, 0.9),
        ];
        assert!(coerce_pose(&mixed).is_err());
    }

    #[test]
    fn rejects_sets_without_known_labels() {
        let raw = vec![RawKeypoint::labeled("tail", 1.0, 1.0, 0.9)];
        assert!(coerce_pose(&raw).is_err());
        assert!(coerce_pose(&[]).is_err());
    }
}
