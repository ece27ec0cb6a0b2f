use serde::{Deserialize, Serialize};

use super::{BrownConrady5, Motion, MotionKind, Pose6, SceneId};
use crate::{all_finite, Pt2, Pt3, Real, Vec2};

/// Pinhole intrinsics with Brown-Conrady distortion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: Real,
    pub fy: Real,
    pub cx: Real,
    pub cy: Real,
    #[serde(default)]
    pub distortion: BrownConrady5,
}

impl CameraIntrinsics {
    /// Length of the flat parameter vector, see [`CameraIntrinsics::to_array`].
    pub const DIM: usize = 9;

    pub fn pinhole(fx: Real, fy: Real, cx: Real, cy: Real) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            distortion: BrownConrady5::default(),
        }
    }

    pub fn with_distortion(mut self, distortion: BrownConrady5) -> Self {
        self.distortion = distortion;
        self
    }

    /// Flat layout: `[fx, fy, cx, cy, k1, k2, k3, p1, p2]`.
    pub fn to_array(&self) -> [Real; 9] {
        let [k1, k2, k3, p1, p2] = self.distortion.to_array();
        [self.fx, self.fy, self.cx, self.cy, k1, k2, k3, p1, p2]
    }

    pub fn from_slice(values: &[Real]) -> Option<Self> {
        match values {
            [fx, fy, cx, cy, k1, k2, k3, p1, p2] => Some(Self {
                fx: *fx,
                fy: *fy,
                cx: *cx,
                cy: *cy,
                distortion: BrownConrady5::new(*k1, *k2, *k3, *p1, *p2),
            }),
            _ => None,
        }
    }

    /// `[fx, fy, cx, cy]` for the distortion-free model.
    pub fn pinhole_array(&self) -> [Real; 4] {
        [self.fx, self.fy, self.cx, self.cy]
    }

    pub fn is_finite(&self) -> bool {
        all_finite(&self.to_array())
    }

    /// Project a point given in the camera frame. `None` behind the camera.
    pub fn project(&self, p_cam: &Pt3) -> Option<Pt2> {
        if p_cam.z <= Real::EPSILON {
            return None;
        }
        let n = Vec2::new(p_cam.x / p_cam.z, p_cam.y / p_cam.z);
        let d = self.distortion.distort(&n);
        Some(Pt2::new(self.fx * d.x + self.cx, self.fy * d.y + self.cy))
    }
}

/// A named imaging sensor taking part in the calibration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub name: String,
    /// Identifier of the image stream the capture device reads from.
    #[serde(default)]
    pub source: String,
    pub intrinsics: CameraIntrinsics,
    /// Extrinsics seed: maps reference-frame points into this camera's frame.
    pub motion: Motion,
    /// Per-camera override of the job-level intrinsics fixing policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_intrinsics: Option<bool>,
}

impl Camera {
    pub fn new_static(name: impl Into<String>, intrinsics: CameraIntrinsics, pose: Pose6) -> Self {
        Self {
            name: name.into(),
            source: String::new(),
            intrinsics,
            motion: Motion::fixed(pose),
            fix_intrinsics: None,
        }
    }

    pub fn new_moving(
        name: impl Into<String>,
        intrinsics: CameraIntrinsics,
        default_pose: Pose6,
    ) -> Self {
        Self {
            name: name.into(),
            source: String::new(),
            intrinsics,
            motion: Motion::moving(default_pose),
            fix_intrinsics: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_scene_pose(mut self, scene: SceneId, pose: Pose6) -> Self {
        self.motion.set_scene_pose(scene, pose);
        self
    }

    pub fn with_fixed_intrinsics(mut self, fixed: bool) -> Self {
        self.fix_intrinsics = Some(fixed);
        self
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
