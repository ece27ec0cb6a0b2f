//! Scene pipeline: drive the capture observers scene by scene and bind the
//! returned measurements to registry buffers.
//!
//! For each scene (ascending id):
//! 1. resolve every command's camera and target and the observer of every
//!    participating camera,
//! 2. reset observers, configure targets of interest, trigger,
//! 3. wait (bounded, cancellable) and collect per camera,
//! 4. resolve observed targets and point ids,
//! 5. register camera/target blocks for the scene and append one log entry per
//!    observation.
//!
//! Entries are buffered per scene and only appended once the whole scene
//! succeeded, so a failing scene leaves the log untouched. Registry
//! allocations happen only after every reference of the scene resolved.

use std::collections::BTreeMap;

use extcal_core::{Camera, PointObservation, Scene, SceneId, Target};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::capture::{
    wait_for_completion, CancelToken, CaptureObserver, ObserverMap, TriggerRequest, WaitOutcome,
    WaitPolicy,
};
use crate::error::{RegistryError, SceneError};
use crate::observation_log::{ObservationBlocks, ObservationEntry, ObservationLog};
use crate::registry::EntityRegistry;

/// What to do when a scene references an unknown camera, target or point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Fail the whole run.
    #[default]
    Abort,
    /// Log a warning and continue with the next scene.
    SkipScene,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenePipelineOptions {
    pub wait: WaitPolicy,
    pub resolution: ResolutionPolicy,
}

/// A scene dropped under [`ResolutionPolicy::SkipScene`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedScene {
    pub scene: SceneId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneRunSummary {
    pub processed: Vec<SceneId>,
    pub skipped: Vec<SkippedScene>,
    /// Observation entries appended to the log.
    pub entries: usize,
}

/// Run every scene in ascending id order.
///
/// Timeouts and cancellation always abort; resolution failures follow
/// `options.resolution`.
pub fn run_scenes(
    scenes: &[Scene],
    registry: &mut EntityRegistry,
    log: &mut ObservationLog,
    observers: &mut ObserverMap,
    options: &ScenePipelineOptions,
    cancel: &CancelToken,
) -> Result<SceneRunSummary, SceneError> {
    let mut ordered: Vec<&Scene> = scenes.iter().collect();
    ordered.sort_by_key(|scene| scene.id);

    let mut summary = SceneRunSummary::default();
    for scene in ordered {
        match run_scene(scene, registry, log, observers, &options.wait, cancel) {
            Ok(count) => {
                summary.processed.push(scene.id);
                summary.entries += count;
            }
            Err(err)
                if err.is_resolution() && options.resolution == ResolutionPolicy::SkipScene =>
            {
                warn!("skipping scene {}: {}", scene.id, err);
                summary.skipped.push(SkippedScene {
                    scene: scene.id,
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }
    info!(
        "scene pipeline: {} scenes processed, {} skipped, {} observations",
        summary.processed.len(),
        summary.skipped.len(),
        summary.entries
    );
    Ok(summary)
}

fn observer_mut<'o>(
    observers: &'o mut ObserverMap,
    scene: SceneId,
    camera: &str,
) -> Result<&'o mut Box<dyn CaptureObserver>, SceneError> {
    observers
        .get_mut(camera)
        .ok_or_else(|| SceneError::MissingObserver {
            scene,
            camera: camera.to_string(),
        })
}

/// Process a single scene and return the number of log entries it added.
pub fn run_scene(
    scene: &Scene,
    registry: &mut EntityRegistry,
    log: &mut ObservationLog,
    observers: &mut ObserverMap,
    wait: &WaitPolicy,
    cancel: &CancelToken,
) -> Result<usize, SceneError> {
    let scene_id = scene.id;
    let resolution = move |source: RegistryError| SceneError::Resolution {
        scene: scene_id,
        source,
    };
    info!(
        "scene {}: {} observation commands",
        scene_id,
        scene.commands.len()
    );

    // Resolve everything up front; the devices are not touched on failure.
    let camera_names = scene.cameras();
    let mut cameras: Vec<Camera> = Vec::with_capacity(camera_names.len());
    for name in &camera_names {
        cameras.push(registry.camera_by_name(name).map_err(resolution)?.clone());
        observer_mut(observers, scene_id, name)?;
    }
    let mut targets: BTreeMap<String, Target> = BTreeMap::new();
    for cmd in &scene.commands {
        if !targets.contains_key(&cmd.target) {
            let target = registry.target_by_name(&cmd.target).map_err(resolution)?;
            targets.insert(cmd.target.clone(), target.clone());
        }
    }

    for name in &camera_names {
        let observer = observer_mut(observers, scene_id, name)?;
        observer.reset_observations();
        observer.reset_targets();
    }
    for cmd in &scene.commands {
        let target = &targets[&cmd.target];
        debug!(
            "scene {}: camera {} looks for {} in {:?}",
            scene_id, cmd.camera, cmd.target, cmd.roi
        );
        observer_mut(observers, scene_id, &cmd.camera)?.configure_target(target, &cmd.roi);
    }
    let request = TriggerRequest {
        scene: scene_id,
        trigger: &scene.trigger,
    };
    for name in &camera_names {
        observer_mut(observers, scene_id, name)?.trigger(&request);
    }

    let mut captured: Vec<(Camera, Vec<PointObservation>)> = Vec::with_capacity(cameras.len());
    for camera in cameras {
        let observer = observer_mut(observers, scene_id, &camera.name)?;
        match wait_for_completion(&**observer, wait, cancel) {
            WaitOutcome::Complete => {}
            WaitOutcome::TimedOut => {
                return Err(SceneError::ObservationTimeout {
                    scene: scene_id,
                    camera: camera.name.clone(),
                    timeout: wait.timeout,
                })
            }
            WaitOutcome::Cancelled => {
                return Err(SceneError::Cancelled {
                    scene: scene_id,
                    camera: camera.name.clone(),
                })
            }
        }
        let points = observer.collect_observations();
        debug!(
            "scene {}: camera {} returned {} observations",
            scene_id,
            camera.name,
            points.len()
        );
        captured.push((camera, points));
    }

    // Observations may name targets without a command in this scene.
    for (_, points) in &captured {
        for obs in points {
            if !targets.contains_key(&obs.target) {
                let target = registry.target_by_name(&obs.target).map_err(resolution)?;
                targets.insert(obs.target.clone(), target.clone());
            }
            let target = &targets[&obs.target];
            if obs.point_id >= target.num_points() {
                return Err(resolution(RegistryError::PointNotFound {
                    target: obs.target.clone(),
                    point_id: obs.point_id,
                    available: target.num_points(),
                }));
            }
        }
    }

    let mut entries = Vec::new();
    for (camera, points) in &captured {
        let cam_blocks = registry
            .register_camera(camera, scene_id)
            .map_err(resolution)?;
        for obs in points {
            let target_blocks = registry
                .register_target(&targets[&obs.target], scene_id)
                .map_err(resolution)?;
            let point = target_blocks.points.get(obs.point_id).ok_or_else(|| {
                resolution(RegistryError::PointNotFound {
                    target: obs.target.clone(),
                    point_id: obs.point_id,
                    available: target_blocks.points.len(),
                })
            })?;
            entries.push(ObservationEntry {
                camera: camera.name.clone(),
                target: obs.target.clone(),
                scene: scene_id,
                point_id: obs.point_id,
                pixel: obs.pixel(),
                blocks: ObservationBlocks {
                    intrinsics: cam_blocks.intrinsics,
                    extrinsics: cam_blocks.extrinsics,
                    target_pose: target_blocks.pose,
                    point,
                },
            });
        }
    }

    let count = entries.len();
    log.extend(entries);
    info!("scene {}: {} observations logged", scene_id, count);
    Ok(count)
}
