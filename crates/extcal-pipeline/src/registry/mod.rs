//! Entity registry: one parameter buffer per (entity, scene) key.
//!
//! Cameras own an intrinsics buffer and either one shared extrinsics buffer
//! (static) or one per scene (moving). Targets own one buffer per point, shared
//! across scenes, plus either one shared pose buffer or one per scene.
//! Registration is idempotent: asking again for an existing key returns the
//! existing handles without allocating.

mod arena;

use std::collections::BTreeMap;

use extcal_core::{Camera, MotionKind, SceneId, Target};
use extcal_optim::params::{pack_intrinsics, pack_point, pack_pose};
use nalgebra::DVector;

use crate::error::{EntityKind, RegistryError};

pub use arena::{BlockKind, ParamArena, ParamBuffer, ParamHandle};

/// Handles of a camera's buffers for one scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraBlocks {
    pub intrinsics: ParamHandle,
    pub extrinsics: ParamHandle,
}

/// Contiguous run of point buffers; point id `i` lives at `first + i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointBlocks {
    first: usize,
    len: usize,
}

impl PointBlocks {
    pub fn get(&self, point_id: usize) -> Option<ParamHandle> {
        (point_id < self.len).then(|| ParamHandle(self.first + point_id))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = ParamHandle> {
        (self.first..self.first + self.len).map(ParamHandle)
    }
}

/// Handles of a target's buffers for one scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetBlocks {
    pub pose: ParamHandle,
    pub points: PointBlocks,
}

#[derive(Debug, Clone)]
enum PoseSlots {
    Static(ParamHandle),
    Moving(BTreeMap<SceneId, ParamHandle>),
}

impl PoseSlots {
    fn kind(&self) -> MotionKind {
        match self {
            PoseSlots::Static(_) => MotionKind::Static,
            PoseSlots::Moving(_) => MotionKind::Moving,
        }
    }
}

#[derive(Debug, Clone)]
struct CameraEntry {
    camera: Camera,
    intrinsics: ParamHandle,
    extrinsics: PoseSlots,
}

#[derive(Debug, Clone)]
struct TargetEntry {
    target: Target,
    points: PointBlocks,
    pose: PoseSlots,
}

/// Registry of cameras, targets and the parameter buffers they own.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    arena: ParamArena,
    cameras: BTreeMap<String, CameraEntry>,
    targets: BTreeMap<String, TargetEntry>,
}

fn check_motion(
    kind: EntityKind,
    name: &str,
    registered: MotionKind,
    requested: MotionKind,
) -> Result<(), RegistryError> {
    if registered == requested {
        Ok(())
    } else {
        Err(RegistryError::MotionMismatch {
            kind,
            name: name.to_string(),
            registered,
            requested,
        })
    }
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard every entity and buffer. Invalidates all handles.
    pub fn clear(&mut self) {
        self.arena.clear();
        self.cameras.clear();
        self.targets.clear();
    }

    pub fn register_static_camera(
        &mut self,
        camera: &Camera,
    ) -> Result<CameraBlocks, RegistryError> {
        let name = camera.name.as_str();
        check_motion(EntityKind::Camera, name, camera.motion_kind(), MotionKind::Static)?;
        if let Some(entry) = self.cameras.get(name) {
            return match entry.extrinsics {
                PoseSlots::Static(extrinsics) => Ok(CameraBlocks {
                    intrinsics: entry.intrinsics,
                    extrinsics,
                }),
                PoseSlots::Moving(_) => Err(RegistryError::MotionMismatch {
                    kind: EntityKind::Camera,
                    name: name.to_string(),
                    registered: MotionKind::Moving,
                    requested: MotionKind::Static,
                }),
            };
        }

        let intrinsics = self.arena.allocate(
            format!("camera/{name}/intrinsics"),
            BlockKind::Intrinsics,
            pack_intrinsics(&camera.intrinsics),
        );
        let extrinsics = self.arena.allocate(
            format!("camera/{name}/extrinsics"),
            BlockKind::Extrinsics,
            pack_pose(&camera.motion.default_pose()),
        );
        self.cameras.insert(
            name.to_string(),
            CameraEntry {
                camera: camera.clone(),
                intrinsics,
                extrinsics: PoseSlots::Static(extrinsics),
            },
        );
        Ok(CameraBlocks {
            intrinsics,
            extrinsics,
        })
    }

    /// Make a moving camera known without creating any per-scene block.
    /// Returns its intrinsics handle.
    pub fn declare_moving_camera(
        &mut self,
        camera: &Camera,
    ) -> Result<ParamHandle, RegistryError> {
        let name = camera.name.as_str();
        check_motion(EntityKind::Camera, name, camera.motion_kind(), MotionKind::Moving)?;
        if let Some(entry) = self.cameras.get(name) {
            check_motion(EntityKind::Camera, name, entry.extrinsics.kind(), MotionKind::Moving)?;
            return Ok(entry.intrinsics);
        }
        let intrinsics = self.arena.allocate(
            format!("camera/{name}/intrinsics"),
            BlockKind::Intrinsics,
            pack_intrinsics(&camera.intrinsics),
        );
        self.cameras.insert(
            name.to_string(),
            CameraEntry {
                camera: camera.clone(),
                intrinsics,
                extrinsics: PoseSlots::Moving(BTreeMap::new()),
            },
        );
        Ok(intrinsics)
    }

    pub fn register_moving_camera(
        &mut self,
        camera: &Camera,
        scene: SceneId,
    ) -> Result<CameraBlocks, RegistryError> {
        let intrinsics = self.declare_moving_camera(camera)?;
        let name = camera.name.as_str();
        let Some(entry) = self.cameras.get_mut(name) else {
            return Err(RegistryError::CameraNotFound(name.to_string()));
        };
        let PoseSlots::Moving(slots) = &mut entry.extrinsics else {
            return Err(RegistryError::CameraNotFound(name.to_string()));
        };
        if let Some(&extrinsics) = slots.get(&scene) {
            return Ok(CameraBlocks {
                intrinsics,
                extrinsics,
            });
        }
        let extrinsics = self.arena.allocate(
            format!("camera/{name}/extrinsics@{scene}"),
            BlockKind::Extrinsics,
            pack_pose(&entry.camera.initial_pose(scene)),
        );
        slots.insert(scene, extrinsics);
        Ok(CameraBlocks {
            intrinsics,
            extrinsics,
        })
    }

    fn allocate_points(arena: &mut ParamArena, target: &Target) -> PointBlocks {
        let first = arena.len();
        for (idx, p) in target.points.iter().enumerate() {
            arena.allocate(
                format!("target/{}/point/{idx}", target.name),
                BlockKind::Point,
                pack_point(p),
            );
        }
        PointBlocks {
            first,
            len: target.points.len(),
        }
    }

    pub fn register_static_target(
        &mut self,
        target: &Target,
    ) -> Result<TargetBlocks, RegistryError> {
        let name = target.name.as_str();
        check_motion(EntityKind::Target, name, target.motion_kind(), MotionKind::Static)?;
        if let Some(entry) = self.targets.get(name) {
            return match entry.pose {
                PoseSlots::Static(pose) => Ok(TargetBlocks {
                    pose,
                    points: entry.points,
                }),
                PoseSlots::Moving(_) => Err(RegistryError::MotionMismatch {
                    kind: EntityKind::Target,
                    name: name.to_string(),
                    registered: MotionKind::Moving,
                    requested: MotionKind::Static,
                }),
            };
        }

        let points = Self::allocate_points(&mut self.arena, target);
        let pose = self.arena.allocate(
            format!("target/{name}/pose"),
            BlockKind::TargetPose,
            pack_pose(&target.motion.default_pose()),
        );
        self.targets.insert(
            name.to_string(),
            TargetEntry {
                target: target.clone(),
                points,
                pose: PoseSlots::Static(pose),
            },
        );
        Ok(TargetBlocks { pose, points })
    }

    /// Make a moving target known, allocating its shared point blocks but no
    /// per-scene pose.
    pub fn declare_moving_target(
        &mut self,
        target: &Target,
    ) -> Result<PointBlocks, RegistryError> {
        let name = target.name.as_str();
        check_motion(EntityKind::Target, name, target.motion_kind(), MotionKind::Moving)?;
        if let Some(entry) = self.targets.get(name) {
            check_motion(EntityKind::Target, name, entry.pose.kind(), MotionKind::Moving)?;
            return Ok(entry.points);
        }
        let points = Self::allocate_points(&mut self.arena, target);
        self.targets.insert(
            name.to_string(),
            TargetEntry {
                target: target.clone(),
                points,
                pose: PoseSlots::Moving(BTreeMap::new()),
            },
        );
        Ok(points)
    }

    pub fn register_moving_target(
        &mut self,
        target: &Target,
        scene: SceneId,
    ) -> Result<TargetBlocks, RegistryError> {
        let points = self.declare_moving_target(target)?;
        let name = target.name.as_str();
        let Some(entry) = self.targets.get_mut(name) else {
            return Err(RegistryError::TargetNotFound(name.to_string()));
        };
        let PoseSlots::Moving(slots) = &mut entry.pose else {
            return Err(RegistryError::TargetNotFound(name.to_string()));
        };
        if let Some(&pose) = slots.get(&scene) {
            return Ok(TargetBlocks { pose, points });
        }
        let pose = self.arena.allocate(
            format!("target/{name}/pose@{scene}"),
            BlockKind::TargetPose,
            pack_pose(&entry.target.initial_pose(scene)),
        );
        slots.insert(scene, pose);
        Ok(TargetBlocks { pose, points })
    }

    /// Register `camera` for `scene` according to its motion kind.
    pub fn register_camera(
        &mut self,
        camera: &Camera,
        scene: SceneId,
    ) -> Result<CameraBlocks, RegistryError> {
        if camera.is_moving() {
            self.register_moving_camera(camera, scene)
        } else {
            self.register_static_camera(camera)
        }
    }

    /// Register `target` for `scene` according to its motion kind.
    pub fn register_target(
        &mut self,
        target: &Target,
        scene: SceneId,
    ) -> Result<TargetBlocks, RegistryError> {
        if target.is_moving() {
            self.register_moving_target(target, scene)
        } else {
            self.register_static_target(target)
        }
    }

    pub fn camera_by_name(&self, name: &str) -> Result<&Camera, RegistryError> {
        self.camera_entry(name).map(|entry| &entry.camera)
    }

    pub fn target_by_name(&self, name: &str) -> Result<&Target, RegistryError> {
        self.target_entry(name).map(|entry| &entry.target)
    }

    fn camera_entry(&self, name: &str) -> Result<&CameraEntry, RegistryError> {
        self.cameras
            .get(name)
            .ok_or_else(|| RegistryError::CameraNotFound(name.to_string()))
    }

    fn target_entry(&self, name: &str) -> Result<&TargetEntry, RegistryError> {
        self.targets
            .get(name)
            .ok_or_else(|| RegistryError::TargetNotFound(name.to_string()))
    }

    pub fn camera_intrinsics(&self, name: &str) -> Result<ParamHandle, RegistryError> {
        self.camera_entry(name).map(|entry| entry.intrinsics)
    }

    /// Extrinsics of `name` in `scene`; static cameras ignore the scene.
    pub fn camera_extrinsics(
        &self,
        name: &str,
        scene: SceneId,
    ) -> Result<ParamHandle, RegistryError> {
        let entry = self.camera_entry(name)?;
        match &entry.extrinsics {
            PoseSlots::Static(handle) => Ok(*handle),
            PoseSlots::Moving(slots) => {
                slots
                    .get(&scene)
                    .copied()
                    .ok_or_else(|| RegistryError::SceneBlockNotFound {
                        kind: EntityKind::Camera,
                        name: name.to_string(),
                        scene,
                    })
            }
        }
    }

    /// Pose of `name` in `scene`; static targets ignore the scene.
    pub fn target_pose(&self, name: &str, scene: SceneId) -> Result<ParamHandle, RegistryError> {
        let entry = self.target_entry(name)?;
        match &entry.pose {
            PoseSlots::Static(handle) => Ok(*handle),
            PoseSlots::Moving(slots) => {
                slots
                    .get(&scene)
                    .copied()
                    .ok_or_else(|| RegistryError::SceneBlockNotFound {
                        kind: EntityKind::Target,
                        name: name.to_string(),
                        scene,
                    })
            }
        }
    }

    pub fn target_point(&self, name: &str, point_id: usize) -> Result<ParamHandle, RegistryError> {
        let entry = self.target_entry(name)?;
        entry
            .points
            .get(point_id)
            .ok_or_else(|| RegistryError::PointNotFound {
                target: name.to_string(),
                point_id,
                available: entry.points.len(),
            })
    }

    /// Every extrinsics buffer of a camera: `None` for a static camera's
    /// single buffer, `Some(scene)` per scene for a moving one.
    pub fn camera_pose_blocks(
        &self,
        name: &str,
    ) -> Result<Vec<(Option<SceneId>, ParamHandle)>, RegistryError> {
        Ok(slot_list(&self.camera_entry(name)?.extrinsics))
    }

    /// Every pose buffer of a target, keyed like [`Self::camera_pose_blocks`].
    pub fn target_pose_blocks(
        &self,
        name: &str,
    ) -> Result<Vec<(Option<SceneId>, ParamHandle)>, RegistryError> {
        Ok(slot_list(&self.target_entry(name)?.pose))
    }

    pub fn target_point_blocks(&self, name: &str) -> Result<PointBlocks, RegistryError> {
        self.target_entry(name).map(|entry| entry.points)
    }

    pub fn cameras(&self) -> impl Iterator<Item = &Camera> {
        self.cameras.values().map(|entry| &entry.camera)
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.values().map(|entry| &entry.target)
    }

    pub fn num_cameras(&self) -> usize {
        self.cameras.len()
    }

    pub fn num_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn arena(&self) -> &ParamArena {
        &self.arena
    }

    pub fn buffer(&self, handle: ParamHandle) -> Option<&ParamBuffer> {
        self.arena.get(handle)
    }

    pub fn values(&self, handle: ParamHandle) -> Option<&DVector<f64>> {
        self.arena.get(handle).map(ParamBuffer::values)
    }

    /// Overwrite the contents of a buffer; the length must match.
    pub fn set_values(
        &mut self,
        handle: ParamHandle,
        values: &DVector<f64>,
    ) -> Result<(), RegistryError> {
        let Some(buffer) = self.arena.get(handle) else {
            return Err(RegistryError::UnknownHandle(handle.index()));
        };
        let (label, expected) = (buffer.label().to_string(), buffer.kind().dim());
        if self.arena.set_values(handle, values) {
            Ok(())
        } else {
            Err(RegistryError::DimensionMismatch {
                label,
                expected,
                got: values.len(),
            })
        }
    }

    /// Succeeds when `handle` refers to an existing buffer of kind `expected`.
    pub fn validate_handle(
        &self,
        handle: ParamHandle,
        expected: BlockKind,
    ) -> Result<(), RegistryError> {
        match self.arena.get(handle) {
            Some(buffer) if buffer.kind() == expected => Ok(()),
            _ => Err(RegistryError::DanglingHandle {
                index: handle.index(),
                expected,
            }),
        }
    }
}

fn slot_list(slots: &PoseSlots) -> Vec<(Option<SceneId>, ParamHandle)> {
    match slots {
        PoseSlots::Static(handle) => vec![(None, *handle)],
        PoseSlots::Moving(slots) => slots.iter().map(|(scene, h)| (Some(*scene), *h)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extcal_core::{CameraIntrinsics, Pose6, Pt3};

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics::pinhole(500.0, 500.0, 320.0, 240.0)
    }

    fn points() -> Vec<Pt3> {
        Target::grid_points(2, 2, 0.1)
    }

    #[test]
    fn static_camera_registration_is_idempotent() {
        let mut reg = EntityRegistry::new();
        let cam = Camera::new_static("left", intrinsics(), Pose6::identity());
        let a = reg.register_static_camera(&cam).unwrap();
        let allocated = reg.arena().len();
        let b = reg.register_static_camera(&cam).unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.arena().len(), allocated);
        assert_eq!(reg.num_cameras(), 1);
    }

    #[test]
    fn moving_camera_shares_intrinsics_across_scenes() {
        let mut reg = EntityRegistry::new();
        let cam = Camera::new_moving("arm", intrinsics(), Pose6::identity())
            .with_scene_pose(2, Pose6::new([0.0; 3], [0.0, 0.0, 2.0]));
        let s1 = reg.register_moving_camera(&cam, 1).unwrap();
        let s2 = reg.register_moving_camera(&cam, 2).unwrap();
        assert_eq!(s1.intrinsics, s2.intrinsics);
        assert_ne!(s1.extrinsics, s2.extrinsics);
        assert_eq!(reg.register_moving_camera(&cam, 1).unwrap(), s1);

        assert_eq!(reg.values(s1.extrinsics).unwrap().as_slice(), &[0.0; 6]);
        assert_eq!(reg.values(s2.extrinsics).unwrap()[5], 2.0);
        assert_eq!(
            reg.buffer(s2.extrinsics).unwrap().label(),
            "camera/arm/extrinsics@2"
        );
        assert_eq!(reg.camera_extrinsics("arm", 2).unwrap(), s2.extrinsics);
        assert!(matches!(
            reg.camera_extrinsics("arm", 3),
            Err(RegistryError::SceneBlockNotFound { scene: 3, .. })
        ));
    }

    #[test]
    fn motion_kind_is_enforced() {
        let mut reg = EntityRegistry::new();
        let moving = Camera::new_moving("arm", intrinsics(), Pose6::identity());
        let err = reg.register_static_camera(&moving).unwrap_err();
        assert!(matches!(err, RegistryError::MotionMismatch { .. }));
        assert!(reg.arena().is_empty());

        reg.register_moving_camera(&moving, 1).unwrap();
        let as_static = Camera::new_static("arm", intrinsics(), Pose6::identity());
        assert!(reg.register_static_camera(&as_static).is_err());
    }

    #[test]
    fn moving_target_shares_points() {
        let mut reg = EntityRegistry::new();
        let target = Target::new_moving("board", Pose6::identity(), points());
        let s1 = reg.register_moving_target(&target, 1).unwrap();
        let s2 = reg.register_moving_target(&target, 2).unwrap();
        assert_ne!(s1.pose, s2.pose);
        assert_eq!(s1.points, s2.points);
        assert_eq!(s1.points.len(), 4);
        let p3 = reg.target_point("board", 3).unwrap();
        assert_eq!(reg.values(p3).unwrap().as_slice(), &[0.1, 0.1, 0.0]);
        assert!(matches!(
            reg.target_point("board", 4),
            Err(RegistryError::PointNotFound { available: 4, .. })
        ));
    }

    #[test]
    fn declared_moving_camera_has_no_scene_blocks() {
        let mut reg = EntityRegistry::new();
        let cam = Camera::new_moving("arm", intrinsics(), Pose6::identity());
        let intr = reg.declare_moving_camera(&cam).unwrap();
        assert_eq!(reg.declare_moving_camera(&cam).unwrap(), intr);
        assert_eq!(reg.arena().len(), 1);
        assert!(reg.camera_by_name("arm").is_ok());
        assert!(reg.camera_pose_blocks("arm").unwrap().is_empty());
        assert_eq!(reg.register_moving_camera(&cam, 4).unwrap().intrinsics, intr);
    }

    #[test]
    fn lookups_fail_for_unknown_names() {
        let reg = EntityRegistry::new();
        assert_eq!(
            reg.camera_by_name("ghost").unwrap_err(),
            RegistryError::CameraNotFound("ghost".into())
        );
        assert!(reg.target_pose("ghost", 0).is_err());
    }

    #[test]
    fn set_values_checks_length_and_clear_resets() {
        let mut reg = EntityRegistry::new();
        let target = Target::new_static("board", Pose6::identity(), points());
        let blocks = reg.register_static_target(&target).unwrap();
        let new_pose = DVector::from_row_slice(&[0.1, 0.0, 0.0, 1.0, 2.0, 3.0]);
        reg.set_values(blocks.pose, &new_pose).unwrap();
        assert_eq!(reg.values(blocks.pose).unwrap(), &new_pose);
        assert!(reg.set_values(blocks.pose, &DVector::zeros(3)).is_err());
        assert!(reg.validate_handle(blocks.pose, BlockKind::TargetPose).is_ok());
        assert!(reg.validate_handle(blocks.pose, BlockKind::Point).is_err());

        reg.clear();
        assert!(reg.arena().is_empty());
        assert_eq!(reg.num_targets(), 0);
        assert!(reg.validate_handle(blocks.pose, BlockKind::TargetPose).is_err());
    }
}
