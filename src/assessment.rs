//! Mobility test catalog.
//!
//! A `TestDescriptor` names the movement a capture session measures. Ids are
//! `region_movement`, e.g. `shoulder_flexion`.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PassCriteria {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle_degrees: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_cm: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestDescriptor {
    pub id: String,
    pub region: String,
    pub name: String,
    pub description: String,
    pub pass_criteria: PassCriteria,
}

struct Entry {
    region: &'static str,
    movement: &'static str,
    name: &'static str,
    description: &'static str,
    criteria: &'static str,
    angle: Option<u32>,
    distance: Option<u32>,
}

const CATALOG: &[Entry] = &[
    Entry {
        region: "shoulder",
        movement: "flexion",
        name: "Shoulder Flexion Test",
        description: "Raise your arms straight overhead",
        criteria: "Arms should reach near ears without arching back",
        angle: Some(170),
        distance: None,
    },
    Entry {
        region: "shoulder",
        movement: "external_rotation",
        name: "Shoulder External Rotation Test",
        description: "Elbow at 90°, rotate forearm outward",
        criteria: "Forearm should reach 90° from starting position",
        angle: Some(90),
        distance: None,
    },
    Entry {
        region: "shoulder",
        movement: "internal_rotation",
        name: "Shoulder Internal Rotation Test",
        description: "Hand behind back, reach up spine",
        criteria: "Thumb should reach between shoulder blades",
        angle: None,
        distance: None,
    },
    Entry {
        region: "hip",
        movement: "internal_rotation",
        name: "Hip Internal Rotation Test",
        description: "Seated, rotate foot outward (knee stays still)",
        criteria: "35-45° of internal rotation is normal",
        angle: Some(35),
        distance: None,
    },
    Entry {
        region: "hip",
        movement: "external_rotation",
        name: "Hip External Rotation Test",
        description: "Seated, rotate foot inward (knee stays still)",
        criteria: "45° of external rotation is normal",
        angle: Some(45),
        distance: None,
    },
    Entry {
        region: "hip",
        movement: "flexion",
        name: "Hip Flexion Test",
        description: "Lying down, bring knee to chest",
        criteria: "Knee should come close to chest without opposite leg lifting",
        angle: Some(120),
        distance: None,
    },
    Entry {
        region: "ankle",
        movement: "dorsiflexion",
        name: "Ankle Dorsiflexion Test",
        description: "Knee to wall test: how far can your toe be from the wall?",
        criteria: "Normal is 10-12cm from wall to toe",
        angle: None,
        distance: Some(10),
    },
    Entry {
        region: "spine",
        movement: "flexion",
        name: "Spine Flexion Test",
        description: "Standing forward bend",
        criteria: "Fingertips should reach floor or within 10cm",
        angle: None,
        distance: None,
    },
    Entry {
        region: "spine",
        movement: "rotation",
        name: "Thoracic Rotation Test",
        description: "Seated with stick across shoulders, rotate left and right",
        criteria: "45° rotation each direction is normal",
        angle: Some(45),
        distance: None,
    },
    Entry {
        region: "functional",
        movement: "overhead_squat",
        name: "Overhead Squat Assessment",
        description: "Arms overhead, perform full squat",
        criteria: "Heels stay down, knees track over toes, arms stay overhead, no excessive forward lean",
        angle: None,
        distance: None,
    },
];

impl Entry {
    fn descriptor(&self) -> TestDescriptor {
        TestDescriptor {
            id: format!("{}_{}", self.region, self.movement),
            region: self.region.to_string(),
            name: self.name.to_string(),
            description: self.description.to_string(),
            pass_criteria: PassCriteria {
                description: self.criteria.to_string(),
                angle_degrees: self.angle,
                distance_cm: self.distance,
            },
        }
    }
}

/// Every built-in test, in catalog order.
pub fn catalog() -> impl Iterator<Item = TestDescriptor> {
    CATALOG.iter().map(Entry::descriptor)
}

impl TestDescriptor {
    /// Look up a built-in test by id.
    pub fn find(id: &str) -> Option<Self> {
        let (region, movement) = id.split_once('_')?;
        CATALOG
            .iter()
            .find(|e| e.region == region && e.movement == movement)
            .map(Entry::descriptor)
    }

    /// Ad-hoc test outside the catalog.
    pub fn custom(id: &str, name: &str) -> Result<Self> {
        let Some((region, _)) = id.split_once('_') else {
            bail!("test id {:?} is not of the form region_movement", id);
        };
        if region.is_empty() || id.chars().any(char::is_whitespace) {
            bail!("test id {:?} is not of the form region_movement", id);
        }
        Ok(Self {
            id: id.to_string(),
            region: region.to_string(),
            name: name.to_string(),
            description: String::new(),
            pass_criteria: PassCriteria {
                description: String::new(),
                angle_degrees: None,
                distance_cm: None,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_ids_are_unique_and_findable() {
        let ids: Vec<String> = catalog().map(|t| t.id).collect();
        assert_eq!(ids.len(), 10);
        for id in &ids {
            assert_eq!(ids.iter().filter(|other| *other == id).count(), 1);
            assert_eq!(TestDescriptor::find(id).map(|t| t.id), Some(id.clone()));
        }
    }

    #[test]
    fn multi_word_movements_resolve() {
        let test = TestDescriptor::find("functional_overhead_squat").unwrap();
        assert_eq!(test.region, "functional");
        assert_eq!(test.name, "Overhead Squat Assessment");
        let test = TestDescriptor::find("shoulder_flexion").unwrap();
        assert_eq!(test.pass_criteria.angle_degrees, Some(170));
    }

    #[test]
    fn unknown_ids_are_none() {
        assert!(TestDescriptor::find("elbow_flexion").is_none());
        assert!(TestDescriptor::find("shoulder").is_none());
    }

    #[test]
    fn custom_ids_need_a_region() {
        assert!(TestDescriptor::custom("wrist_extension", "Wrist").is_ok());
        assert!(TestDescriptor::custom("wrist", "Wrist").is_err());
        assert!(TestDescriptor::custom("_x", "X").is_err());
    }
}
