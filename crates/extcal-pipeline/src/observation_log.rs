//! Observation log: pixel measurements bound to registry buffers.

use extcal_core::{Pt2, SceneId};

use crate::error::RegistryError;
use crate::registry::{BlockKind, EntityRegistry, ParamHandle};

/// The four buffers a measurement depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationBlocks {
    pub intrinsics: ParamHandle,
    /// Shared for static cameras, per scene for moving ones.
    pub extrinsics: ParamHandle,
    /// Shared for static targets, per scene for moving ones.
    pub target_pose: ParamHandle,
    pub point: ParamHandle,
}

impl ObservationBlocks {
    fn kinds(&self) -> [(ParamHandle, BlockKind); 4] {
        [
            (self.intrinsics, BlockKind::Intrinsics),
            (self.extrinsics, BlockKind::Extrinsics),
            (self.target_pose, BlockKind::TargetPose),
            (self.point, BlockKind::Point),
        ]
    }
}

/// One captured (camera, target, point, scene) measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationEntry {
    pub camera: String,
    pub target: String,
    pub scene: SceneId,
    pub point_id: usize,
    pub pixel: Pt2,
    pub blocks: ObservationBlocks,
}

/// Append-only list of observations owned by a job and reset at run start.
#[derive(Debug, Clone, Default)]
pub struct ObservationLog {
    entries: Vec<ObservationEntry>,
}

impl ObservationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ObservationEntry) {
        self.entries.push(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = ObservationEntry>) {
        self.entries.extend(entries);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ObservationEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[ObservationEntry] {
        &self.entries
    }

    pub fn for_scene(&self, scene: SceneId) -> impl Iterator<Item = &ObservationEntry> {
        self.entries.iter().filter(move |e| e.scene == scene)
    }

    /// Check that every entry refers to live buffers of the right kind.
    pub fn check_integrity(&self, registry: &EntityRegistry) -> Result<(), RegistryError> {
        for entry in &self.entries {
            for (handle, kind) in entry.blocks.kinds() {
                registry.validate_handle(handle, kind)?;
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ObservationLog {
    type Item = &'a ObservationEntry;
    type IntoIter = std::slice::Iter<'a, ObservationEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extcal_core::{Camera, CameraIntrinsics, Pose6, Target};

    fn entry(registry: &mut EntityRegistry) -> ObservationEntry {
        let k = CameraIntrinsics::pinhole(1.0, 1.0, 0.0, 0.0);
        let cam = Camera::new_static("cam", k, Pose6::identity());
        let points = Target::grid_points(1, 2, 1.0);
        let target = Target::new_static("board", Pose6::identity(), points);
        let c = registry.register_static_camera(&cam).unwrap();
        let t = registry.register_static_target(&target).unwrap();
        ObservationEntry {
            camera: "cam".into(),
            target: "board".into(),
            scene: 1,
            point_id: 1,
            pixel: Pt2::new(1.0, 2.0),
            blocks: ObservationBlocks {
                intrinsics: c.intrinsics,
                extrinsics: c.extrinsics,
                target_pose: t.pose,
                point: t.points.get(1).unwrap(),
            },
        }
    }

    #[test]
    fn integrity_holds_for_registered_blocks() {
        let mut registry = EntityRegistry::new();
        let mut log = ObservationLog::new();
        log.push(entry(&mut registry));
        assert!(log.check_integrity(&registry).is_ok());
        assert_eq!(log.for_scene(1).count(), 1);
        assert_eq!(log.for_scene(2).count(), 0);
    }

    #[test]
    fn integrity_fails_after_registry_clear() {
        let mut registry = EntityRegistry::new();
        let mut log = ObservationLog::new();
        log.push(entry(&mut registry));
        registry.clear();
        assert!(log.check_integrity(&registry).is_err());
    }

    #[test]
    fn integrity_detects_swapped_blocks() {
        let mut registry = EntityRegistry::new();
        let mut bad = entry(&mut registry);
        std::mem::swap(&mut bad.blocks.extrinsics, &mut bad.blocks.target_pose);
        let mut log = ObservationLog::new();
        log.push(bad);
        assert!(matches!(
            log.check_integrity(&registry),
            Err(RegistryError::DanglingHandle {
                expected: BlockKind::Extrinsics,
                ..
            })
        ));
    }
}
