/// The 17 MoveNet landmarks, in the order every `Pose` stores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl KeypointIndex {
    pub const COUNT: usize = 17;

    pub const ALL: [KeypointIndex; Self::COUNT] = [
        Self::Nose,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftEar,
        Self::RightEar,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Canonical snake_case label, as sent across the analysis boundary.
    pub fn label(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
        }
    }

    /// Resolve a backend-provided label. Case and separators are ignored, so
    /// `leftShoulder`, `Left Shoulder` and `left_shoulder` all match.
    pub fn from_label(label: &str) -> Option<Self> {
        let wanted = squash(label);
        Self::ALL
            .iter()
            .copied()
            .find(|index| squash(index.label()) == wanted)
    }
}

fn squash(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// One landmark in pixel coordinates of the source frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    x: f32,
    y: f32,
    confidence: f32,
    label: &'static str,
}

impl Keypoint {
    pub(crate) fn new(index: KeypointIndex, x: f32, y: f32, confidence: f32) -> Self {
        Self {
            x,
            y,
            confidence,
            label: index.label(),
        }
    }

    pub(crate) fn undetected(index: KeypointIndex) -> Self {
        Self::new(index, 0.0, 0.0, 0.0)
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Strictly above the threshold.
    pub fn is_visible(&self, threshold: f32) -> bool {
        self.confidence > threshold
    }

    /// Rounded pixel position for drawing.
    pub fn to_pixel(&self) -> (i32, i32) {
        (self.x.round() as i32, self.y.round() as i32)
    }
}

/// Exactly 17 keypoints of a single person in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    keypoints: [Keypoint; KeypointIndex::COUNT],
}

impl Pose {
    /// Build a pose from per-landmark `(x, y, confidence)` values.
    ///
    /// Confidence is clamped into `[0, 1]`.
    pub fn from_fn(mut f: impl FnMut(KeypointIndex) -> (f32, f32, f32)) -> Self {
        let keypoints = KeypointIndex::ALL.map(|index| {
            let (x, y, confidence) = f(index);
            Keypoint::new(index, x, y, confidence.clamp(0.0, 1.0))
        });
        Self { keypoints }
    }

    /// Every landmark at the same position and confidence.
    pub fn uniform(x: f32, y: f32, confidence: f32) -> Self {
        Self::from_fn(|_| (x, y, confidence))
    }

    pub fn get(&self, index: KeypointIndex) -> &Keypoint {
        &self.keypoints[index as usize]
    }

    pub fn keypoints(&self) -> &[Keypoint; KeypointIndex::COUNT] {
        &self.keypoints
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keypoint> {
        self.keypoints.iter()
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            keypoints: KeypointIndex::ALL.map(Keypoint::undetected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypoint_index_round_trips_through_position() {
        for (i, index) in KeypointIndex::ALL.iter().enumerate() {
            assert_eq!(*index as usize, i);
            assert_eq!(KeypointIndex::from_index(i), Some(*index));
        }
        assert_eq!(KeypointIndex::from_index(17), None);
    }

    #[test]
    fn labels_resolve_loosely() {
        assert_eq!(
            KeypointIndex::from_label("leftShoulder"),
            Some(KeypointIndex::LeftShoulder)
        );
        assert_eq!(
            KeypointIndex::from_label("Right Ankle"),
            Some(KeypointIndex::RightAnkle)
        );
        assert_eq!(KeypointIndex::from_label("nose"), Some(KeypointIndex::Nose));
        assert_eq!(KeypointIndex::from_label("tail"), None);
    }

    #[test]
    fn pose_keeps_anatomical_order() {
        let pose = Pose::from_fn(|index| (index as usize as f32, 0.0, 0.5));
        assert_eq!(pose.get(KeypointIndex::RightAnkle).x(), 16.0);
        assert_eq!(pose.get(KeypointIndex::RightAnkle).label(), "right_ankle");
        assert_eq!(pose.keypoints()[5].label(), "left_shoulder");
    }

    #[test]
    fn confidence_is_clamped() {
        let pose = Pose::from_fn(|_| (0.0, 0.0, 1.7));
        assert!(pose.iter().all(|kp| kp.confidence() == 1.0));
    }

    #[test]
    fn default_pose_is_undetected() {
        let pose = Pose::default();
        assert!(pose.iter().all(|kp| kp.confidence() == 0.0));
    }

    #[test]
    fn visibility_is_strict() {
        let kp = Keypoint::new(KeypointIndex::Nose, 1.0, 2.0, 0.3);
        assert!(!kp.is_visible(0.3));
        assert!(kp.is_visible(0.29));
    }
}
