use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Pose6, SceneId};

/// Whether an entity keeps a single pose for the whole job or gets one per scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionKind {
    Static,
    Moving,
}

impl fmt::Display for MotionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionKind::Static => f.write_str("static"),
            MotionKind::Moving => f.write_str("moving"),
        }
    }
}

/// Pose seeds of a camera or target.
///
/// Moving entities carry a default pose plus optional per-scene seeds; a scene
/// without its own seed starts from the default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Motion {
    Static {
        pose: Pose6,
    },
    Moving {
        default_pose: Pose6,
        scene_poses: BTreeMap<SceneId, Pose6>,
    },
}

impl Motion {
    pub fn fixed(pose: Pose6) -> Self {
        Motion::Static { pose }
    }

    pub fn moving(default_pose: Pose6) -> Self {
        Motion::Moving {
            default_pose,
            scene_poses: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> MotionKind {
        match self {
            Motion::Static { .. } => MotionKind::Static,
            Motion::Moving { .. } => MotionKind::Moving,
        }
    }

    pub fn is_moving(&self) -> bool {
        self.kind() == MotionKind::Moving
    }

    pub fn default_pose(&self) -> Pose6 {
        match self {
            Motion::Static { pose } => *pose,
            Motion::Moving { default_pose, .. } => *default_pose,
        }
    }

    /// Initial pose for `scene`. Static entities ignore the scene.
    pub fn initial_pose(&self, scene: SceneId) -> Pose6 {
        match self {
            Motion::Static { pose } => *pose,
            Motion::Moving {
                default_pose,
                scene_poses,
            } => scene_poses.get(&scene).copied().unwrap_or(*default_pose),
        }
    }

    /// Record a per-scene seed. Returns the previous seed for that scene, if any.
    /// Static motions are left untouched and return `None`.
    pub fn set_scene_pose(&mut self, scene: SceneId, pose: Pose6) -> Option<Pose6> {
        match self {
            Motion::Static { .. } => None,
            Motion::Moving { scene_poses, .. } => scene_poses.insert(scene, pose),
        }
    }

    /// Scenes with an explicit seed, in ascending order.
    pub fn seeded_scenes(&self) -> Vec<SceneId> {
        match self {
            Motion::Static { .. } => Vec::new(),
            Motion::Moving { scene_poses, .. } => scene_poses.keys().copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_falls_back_to_default_pose() {
        let default_pose = Pose6::new([0.0; 3], [0.0, 0.0, 1.0]);
        let scene_pose = Pose6::new([0.0; 3], [0.0, 0.0, 2.0]);
        let mut motion = Motion::moving(default_pose);
        assert_eq!(motion.set_scene_pose(3, scene_pose), None);
        assert_eq!(motion.initial_pose(3), scene_pose);
        assert_eq!(motion.initial_pose(4), default_pose);
        assert_eq!(motion.seeded_scenes(), vec![3]);
    }

    #[test]
    fn static_ignores_scene_seeds() {
        let pose = Pose6::new([0.1, 0.0, 0.0], [0.0; 3]);
        let mut motion = Motion::fixed(pose);
        assert_eq!(motion.set_scene_pose(1, Pose6::identity()), None);
        assert_eq!(motion.initial_pose(1), pose);
        assert!(!motion.is_moving());
    }
}
