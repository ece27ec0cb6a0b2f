//! Serde mirrors of the three configuration documents.
//!
//! Field names follow the calibration YAML files used in the field, so existing
//! `cameras.yaml` / `targets.yaml` / `job.yaml` sets load unchanged.

use extcal_core::SceneId;
use serde::{Deserialize, Serialize};

use crate::job::JobOptions;

/// Camera definitions document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraDocument {
    #[serde(default)]
    pub static_cameras: Vec<CameraRecord>,
    /// A moving camera may appear once per scene to seed that scene's pose.
    #[serde(default)]
    pub moving_cameras: Vec<CameraRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraRecord {
    pub camera_name: String,
    #[serde(default)]
    pub image_topic: String,
    pub angle_axis_ax: f64,
    pub angle_axis_ay: f64,
    pub angle_axis_az: f64,
    pub position_x: f64,
    pub position_y: f64,
    pub position_z: f64,
    pub focal_length_x: f64,
    pub focal_length_y: f64,
    pub center_x: f64,
    pub center_y: f64,
    #[serde(default)]
    pub distortion_k1: f64,
    #[serde(default)]
    pub distortion_k2: f64,
    #[serde(default)]
    pub distortion_k3: f64,
    #[serde(default)]
    pub distortion_p1: f64,
    #[serde(default)]
    pub distortion_p2: f64,
    /// Required for moving cameras, ignored for static ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<SceneId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_intrinsics: Option<bool>,
}

/// Target definitions document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetDocument {
    #[serde(default)]
    pub static_targets: Vec<TargetRecord>,
    #[serde(default)]
    pub moving_targets: Vec<TargetRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub target_name: String,
    #[serde(default)]
    pub target_rows: u32,
    #[serde(default)]
    pub target_cols: u32,
    pub angle_axis_ax: f64,
    pub angle_axis_ay: f64,
    pub angle_axis_az: f64,
    pub position_x: f64,
    pub position_y: f64,
    pub position_z: f64,
    /// Declared point count; must match `points` when given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_points: Option<usize>,
    pub points: Vec<PointRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<SceneId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_points: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_pose: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub pnt: [f64; 3],
}

/// Job definition document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDocument {
    #[serde(default)]
    pub reference_frame: String,
    #[serde(default)]
    pub options: JobOptions,
    pub scenes: Vec<SceneRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneRecord {
    pub scene_id: SceneId,
    #[serde(default)]
    pub trigger_type: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trigger_message: String,
    #[serde(default)]
    pub observations: Vec<ObservationRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub camera: String,
    pub target: String,
    pub roi_x_min: f64,
    pub roi_x_max: f64,
    pub roi_y_min: f64,
    pub roi_y_max: f64,
}
