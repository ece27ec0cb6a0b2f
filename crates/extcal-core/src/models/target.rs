use serde::{Deserialize, Serialize};

use super::{Motion, MotionKind, Pose6, SceneId};
use crate::{Pt3, Real};

/// Known calibration object with fixed point geometry in its own frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    /// Maps target-frame points into the reference frame.
    pub motion: Motion,
    /// Grid layout for checkerboard-like targets; `0` when not a grid.
    #[serde(default)]
    pub rows: u32,
    #[serde(default)]
    pub cols: u32,
    /// Point coordinates in the target frame, indexed by point id.
    pub points: Vec<Pt3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_points: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_pose: Option<bool>,
}

impl Target {
    pub fn new_static(name: impl Into<String>, pose: Pose6, points: Vec<Pt3>) -> Self {
        Self {
            name: name.into(),
            motion: Motion::fixed(pose),
            rows: 0,
            cols: 0,
            points,
            fix_points: None,
            fix_pose: None,
        }
    }

    pub fn new_moving(name: impl Into<String>, default_pose: Pose6, points: Vec<Pt3>) -> Self {
        Self {
            motion: Motion::moving(default_pose),
            ..Self::new_static(name, default_pose, points)
        }
    }

    /// Planar `rows x cols` grid in the target's z=0 plane, row-major ids.
    pub fn grid_points(rows: u32, cols: u32, spacing: Real) -> Vec<Pt3> {
        let mut points = Vec::with_capacity((rows * cols) as usize);
        for r in 0..rows {
            for c in 0..cols {
                points.push(Pt3::new(c as Real * spacing, r as Real * spacing, 0.0));
            }
        }
        points
    }

    pub fn with_grid(mut self, rows: u32, cols: u32) -> Self {
        self.rows = rows;
        self.cols = cols;
        self
    }

    pub fn with_scene_pose(mut self, scene: SceneId, pose: Pose6) -> Self {
        self.motion.set_scene_pose(scene, pose);
        self
    }

    pub fn with_fixed_points(mut self, fixed: bool) -> Self {
        self.fix_points = Some(fixed);
        self
    }

    pub fn with_fixed_pose(mut self, fixed: bool) -> Self {
        self.fix_pose = Some(fixed);
        self
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn point(&self, point_id: usize) -> Option<&Pt3> {
        self.points.get(point_id)
    }

    pub fn motion_kind(&self) -> MotionKind {
        self.motion.kind()
    }

    pub fn is_moving(&self) -> bool {
        self.motion.is_moving()
    }

    pub fn initial_pose(&self, scene: SceneId) -> Pose6 {
        self.motion.initial_pose(scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_is_row_major() {
        let pts = Target::grid_points(2, 3, 0.1);
        assert_eq!(pts.len(), 6);
        assert_eq!(pts[1], Pt3::new(0.1, 0.0, 0.0));
        assert_eq!(pts[3], Pt3::new(0.0, 0.1, 0.0));
    }

    #[test]
    fn moving_target_keeps_geometry() {
        let t = Target::new_moving("board", Pose6::identity(), Target::grid_points(2, 2, 1.0))
            .with_grid(2, 2);
        assert!(t.is_moving());
        assert_eq!(t.num_points(), 4);
        assert!(t.point(4).is_none());
    }
}
