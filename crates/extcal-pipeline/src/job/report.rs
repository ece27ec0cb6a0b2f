//! Serialisable summary of a calibration run.

use extcal_core::{CameraIntrinsics, Pose6, Pt3, SceneId};
use extcal_optim::backend::SolveSummary;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::assembler::BundleAssembler;
use crate::error::{OptimizationError, RegistryError};
use crate::observation_log::ObservationLog;
use crate::registry::{BlockKind, EntityRegistry, ParamHandle};
use crate::scene::{SceneRunSummary, SkippedScene};

use super::JobState;

/// Pixel reprojection statistics over the observation log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReprojectionStats {
    pub count: usize,
    /// Mean of `||r||` in pixels.
    pub mean: f64,
    /// `sqrt(mean(||r||^2))` in pixels.
    pub rms: f64,
    pub max: f64,
}

impl ReprojectionStats {
    pub fn from_residuals(residuals: &[[f64; 2]]) -> Self {
        if residuals.is_empty() {
            return Self::default();
        }
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut max: f64 = 0.0;
        for r in residuals {
            let sq = r[0] * r[0] + r[1] * r[1];
            let norm = sq.sqrt();
            sum += norm;
            sum_sq += sq;
            max = max.max(norm);
        }
        let n = residuals.len() as f64;
        Self {
            count: residuals.len(),
            mean: sum / n,
            rms: (sum_sq / n).sqrt(),
            max,
        }
    }
}

/// Pose of an entity in one scene; `scene` is `None` for static entities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenePose {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<SceneId>,
    pub pose: Pose6,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraReport {
    pub name: String,
    pub moving: bool,
    pub intrinsics: CameraIntrinsics,
    /// Reference-to-camera transforms.
    pub extrinsics: Vec<ScenePose>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetReport {
    pub name: String,
    pub moving: bool,
    /// Target-to-reference transforms.
    pub poses: Vec<ScenePose>,
    pub points: Vec<Pt3>,
}

/// Current estimates and run outcome of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub reference_frame: String,
    pub state: JobState,
    pub observations: usize,
    pub processed_scenes: Vec<SceneId>,
    pub skipped_scenes: Vec<SkippedScene>,
    pub reprojection: ReprojectionStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SolveSummary>,
    pub cameras: Vec<CameraReport>,
    pub targets: Vec<TargetReport>,
}

fn read_block<'r>(
    registry: &'r EntityRegistry,
    handle: ParamHandle,
    kind: BlockKind,
) -> Result<&'r DVector<f64>, RegistryError> {
    registry.validate_handle(handle, kind)?;
    registry
        .values(handle)
        .ok_or(RegistryError::UnknownHandle(handle.index()))
}

fn dimension_error(registry: &EntityRegistry, handle: ParamHandle, got: usize) -> RegistryError {
    let (label, expected) = registry
        .buffer(handle)
        .map(|b| (b.label().to_string(), b.kind().dim()))
        .unwrap_or_default();
    RegistryError::DimensionMismatch {
        label,
        expected,
        got,
    }
}

fn read_poses(
    registry: &EntityRegistry,
    blocks: Vec<(Option<SceneId>, ParamHandle)>,
    kind: BlockKind,
) -> Result<Vec<ScenePose>, RegistryError> {
    blocks
        .into_iter()
        .map(|(scene, handle)| {
            let values = read_block(registry, handle, kind)?;
            let pose = Pose6::from_slice(values.as_slice())
                .ok_or_else(|| dimension_error(registry, handle, values.len()))?;
            Ok(ScenePose { scene, pose })
        })
        .collect()
}

impl CalibrationReport {
    /// Snapshot the registry estimates and reprojection statistics.
    pub fn build(
        reference_frame: &str,
        state: JobState,
        registry: &EntityRegistry,
        log: &ObservationLog,
        assembler: &BundleAssembler,
        scenes: &SceneRunSummary,
        summary: Option<&SolveSummary>,
    ) -> Result<Self, OptimizationError> {
        let residuals = assembler.reprojection_residuals(registry, log)?;

        let mut cameras = Vec::with_capacity(registry.num_cameras());
        for camera in registry.cameras() {
            let handle = registry.camera_intrinsics(&camera.name)?;
            let values = read_block(registry, handle, BlockKind::Intrinsics)?;
            let intrinsics = CameraIntrinsics::from_slice(values.as_slice())
                .ok_or_else(|| dimension_error(registry, handle, values.len()))?;
            cameras.push(CameraReport {
                name: camera.name.clone(),
                moving: camera.is_moving(),
                intrinsics,
                extrinsics: read_poses(
                    registry,
                    registry.camera_pose_blocks(&camera.name)?,
                    BlockKind::Extrinsics,
                )?,
            });
        }

        let mut targets = Vec::with_capacity(registry.num_targets());
        for target in registry.targets() {
            let mut points = Vec::with_capacity(target.num_points());
            for handle in registry.target_point_blocks(&target.name)?.iter() {
                let v = read_block(registry, handle, BlockKind::Point)?;
                if v.len() != 3 {
                    return Err(dimension_error(registry, handle, v.len()).into());
                }
                points.push(Pt3::new(v[0], v[1], v[2]));
            }
            targets.push(TargetReport {
                name: target.name.clone(),
                moving: target.is_moving(),
                poses: read_poses(
                    registry,
                    registry.target_pose_blocks(&target.name)?,
                    BlockKind::TargetPose,
                )?,
                points,
            });
        }

        Ok(Self {
            reference_frame: reference_frame.to_string(),
            state,
            observations: log.len(),
            processed_scenes: scenes.processed.clone(),
            skipped_scenes: scenes.skipped.clone(),
            reprojection: ReprojectionStats::from_residuals(&residuals),
            summary: summary.cloned(),
            cameras,
            targets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_over_residuals() {
        let stats = ReprojectionStats::from_residuals(&[[3.0, 4.0], [0.0, 0.0]]);
        assert_eq!(stats.count, 2);
        assert!((stats.mean - 2.5).abs() < 1e-12);
        assert!((stats.rms - (12.5f64).sqrt()).abs() < 1e-12);
        assert!((stats.max - 5.0).abs() < 1e-12);
    }

    #[test]
    fn empty_residuals_give_zero_stats() {
        assert_eq!(
            ReprojectionStats::from_residuals(&[]),
            ReprojectionStats::default()
        );
    }
}
