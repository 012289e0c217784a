//! Confidence gate: decides whether a pose is good enough to be the
//! measurement.
//!
//! Pure functions. The score is the mean confidence over all 17 landmarks,
//! so undetected landmarks count as zero and pull the score down.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::pose::{KeypointIndex, Pose};

pub const DEFAULT_THRESHOLD: f32 = 0.35;

/// Mean confidence over all 17 keypoints.
pub fn score(pose: &Pose) -> f32 {
    let total: f32 = pose.iter().map(|k| k.confidence()).sum();
    total / KeypointIndex::COUNT as f32
}

/// Whether `pose` clears `threshold` (strictly greater).
pub fn accept(pose: &Pose, threshold: f32) -> bool {
    score(pose) > threshold
}

/// Acceptance threshold, validated to `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConfidenceGate {
    threshold: f32,
}

impl ConfidenceGate {
    pub fn new(threshold: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            bail!("confidence threshold must be within [0, 1], got {}", threshold);
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn score(&self, pose: &Pose) -> f32 {
        score(pose)
    }

    pub fn accept(&self, pose: &Pose) -> bool {
        accept(pose, self.threshold)
    }
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Live quality indicator shown while the operator frames the subject.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    NoPerson,
    BelowThreshold,
    Acceptable,
}

impl Quality {
    pub fn assess(score: f32, threshold: f32) -> Self {
        if score <= 0.0 {
            Self::NoPerson
        } else if score > threshold {
            Self::Acceptable
        } else {
            Self::BelowThreshold
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NoPerson => "no person in frame",
            Self::BelowThreshold => "low confidence",
            Self::Acceptable => "ready",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_pose(rng: &mut StdRng) -> Pose {
        Pose::from_fn(|_| {
            (
                rng.gen_range(0.0..640.0),
                rng.gen_range(0.0..480.0),
                rng.gen_range(0.0..=1.0),
            )
        })
    }

    #[test]
    fn uniform_confidence_scores_itself() {
        assert!((score(&Pose::uniform(1.0, 1.0, 0.9)) - 0.9).abs() < 1e-6);
        assert_eq!(score(&Pose::default()), 0.0);
    }

    #[test]
    fn zeros_count_toward_the_mean() {
        let pose = Pose::from_fn(|index| {
            if index == KeypointIndex::Nose {
                (0.0, 0.0, 1.0)
            } else {
                (0.0, 0.0, 0.0)
            }
        });
        assert!((score(&pose) - 1.0 / 17.0).abs() < 1e-6);
    }

    #[test]
    fn threshold_is_exclusive() {
        let pose = Pose::uniform(0.0, 0.0, 0.5);
        assert!(!accept(&pose, 0.5));
        assert!(accept(&pose, 0.49));
    }

    #[test]
    fn score_stays_in_unit_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let s = score(&random_pose(&mut rng));
            assert!((0.0..=1.0).contains(&s), "score {} out of range", s);
        }
    }

    #[test]
    fn score_is_order_independent_and_deterministic() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let pose = random_pose(&mut rng);
            let reversed = Pose::from_fn(|index| {
                let mirror = pose.get(KeypointIndex::ALL[KeypointIndex::COUNT - 1 - index as usize]);
                (mirror.x(), mirror.y(), mirror.confidence())
            });
            assert!((score(&pose) - score(&reversed)).abs() < 1e-5);
            assert_eq!(score(&pose), score(&pose));
        }
    }

    #[test]
    fn accept_is_monotone_in_threshold() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let pose = random_pose(&mut rng);
            let low: f32 = rng.gen_range(0.0..0.5);
            let high: f32 = rng.gen_range(0.5..=1.0);
            if accept(&pose, high) {
                assert!(accept(&pose, low));
            }
        }
    }

    #[test]
    fn raising_one_confidence_never_lowers_score() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..200 {
            let pose = random_pose(&mut rng);
            let bump = KeypointIndex::ALL[rng.gen_range(0..KeypointIndex::COUNT)];
            let raised = Pose::from_fn(|index| {
                let k = pose.get(index);
                let c = if index == bump { 1.0 } else { k.confidence() };
                (k.x(), k.y(), c)
            });
            assert!(score(&raised) >= score(&pose));
        }
    }

    #[test]
    fn gate_rejects_out_of_range_threshold() {
        assert!(ConfidenceGate::new(-0.1).is_err());
        assert!(ConfidenceGate::new(1.5).is_err());
        assert!(ConfidenceGate::new(f32::NAN).is_err());
        assert_eq!(ConfidenceGate::default().threshold(), DEFAULT_THRESHOLD);
    }

    #[test]
    fn quality_tracks_score() {
        assert_eq!(Quality::assess(0.0, 0.35), Quality::NoPerson);
        assert_eq!(Quality::assess(0.2, 0.35), Quality::BelowThreshold);
        assert_eq!(Quality::assess(0.35, 0.35), Quality::BelowThreshold);
        assert_eq!(Quality::assess(0.8, 0.35), Quality::Acceptable);
    }
}
