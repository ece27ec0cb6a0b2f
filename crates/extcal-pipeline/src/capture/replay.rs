use std::collections::BTreeMap;

use extcal_core::{PointObservation, Roi, SceneId, Target};
use log::debug;
use serde::{Deserialize, Serialize};

use super::{CaptureObserver, TriggerRequest};

/// Observations recorded for several cameras over several scenes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordedObservations {
    pub scenes: Vec<RecordedScene>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordedScene {
    pub scene_id: SceneId,
    /// Observations per camera name.
    #[serde(default)]
    pub cameras: BTreeMap<String, Vec<PointObservation>>,
}

impl RecordedObservations {
    /// Split the recording into one [`ReplayObserver`] per camera.
    pub fn into_observers(self) -> BTreeMap<String, ReplayObserver> {
        let mut observers: BTreeMap<String, ReplayObserver> = BTreeMap::new();
        for scene in self.scenes {
            for (camera, points) in scene.cameras {
                observers
                    .entry(camera.clone())
                    .or_insert_with(|| ReplayObserver::new(camera))
                    .insert_scene(scene.scene_id, points);
            }
        }
        observers
    }
}

/// Capture observer that serves pre-recorded observations for one camera.
///
/// A trigger for scene `s` makes the recording of `s` available, filtered to
/// the configured targets and their ROIs, and completes immediately.
#[derive(Debug, Clone, Default)]
pub struct ReplayObserver {
    camera: String,
    recorded: BTreeMap<SceneId, Vec<PointObservation>>,
    targets: Vec<(String, Roi)>,
    pending: Vec<PointObservation>,
    complete: bool,
}

impl ReplayObserver {
    pub fn new(camera: impl Into<String>) -> Self {
        Self {
            camera: camera.into(),
            ..Self::default()
        }
    }

    pub fn with_scene(mut self, scene: SceneId, observations: Vec<PointObservation>) -> Self {
        self.insert_scene(scene, observations);
        self
    }

    /// Append observations for `scene` to the recording.
    pub fn insert_scene(&mut self, scene: SceneId, observations: Vec<PointObservation>) {
        self.recorded.entry(scene).or_default().extend(observations);
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    fn accepts(&self, obs: &PointObservation) -> bool {
        self.targets
            .iter()
            .any(|(target, roi)| *target == obs.target && roi.contains(obs.x, obs.y))
    }
}

impl CaptureObserver for ReplayObserver {
    fn reset_observations(&mut self) {
        self.pending.clear();
        self.complete = false;
    }

    fn reset_targets(&mut self) {
        self.targets.clear();
    }

    fn configure_target(&mut self, target: &Target, roi: &Roi) {
        self.targets.push((target.name.clone(), *roi));
    }

    fn trigger(&mut self, request: &TriggerRequest<'_>) {
        let recorded = self.recorded.get(&request.scene).map(Vec::as_slice).unwrap_or(&[]);
        let pending: Vec<PointObservation> = recorded
            .iter()
            .filter(|obs| self.accepts(obs))
            .cloned()
            .collect();
        debug!(
            "replay {}: scene {} serves {} of {} recorded observations",
            self.camera,
            request.scene,
            pending.len(),
            recorded.len()
        );
        self.pending = pending;
        self.complete = true;
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn collect_observations(&mut self) -> Vec<PointObservation> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extcal_core::{Pose6, Pt2, TriggerConfig};

    fn obs(target: &str, id: usize, x: f64, y: f64) -> PointObservation {
        PointObservation::new(target, id, Pt2::new(x, y))
    }

    #[test]
    fn filters_by_target_and_roi() {
        let board = Target::new_static("board", Pose6::identity(), Target::grid_points(2, 2, 1.0));
        let mut observer = ReplayObserver::new("cam").with_scene(
            1,
            vec![
                obs("board", 0, 10.0, 10.0),
                obs("board", 1, 500.0, 10.0),
                obs("other", 0, 10.0, 10.0),
            ],
        );
        observer.reset_observations();
        observer.reset_targets();
        observer.configure_target(&board, &Roi::new(0.0, 100.0, 0.0, 100.0));
        assert!(!observer.is_complete());

        let trigger = TriggerConfig::default();
        observer.trigger(&TriggerRequest {
            scene: 1,
            trigger: &trigger,
        });
        assert!(observer.is_complete());
        let got = observer.collect_observations();
        assert_eq!(got, vec![obs("board", 0, 10.0, 10.0)]);
    }

    #[test]
    fn unknown_scene_completes_empty() {
        let board = Target::new_static("board", Pose6::identity(), Vec::new());
        let mut observer = ReplayObserver::new("cam");
        observer.configure_target(&board, &Roi::unbounded());
        let trigger = TriggerConfig::default();
        observer.trigger(&TriggerRequest {
            scene: 9,
            trigger: &trigger,
        });
        assert!(observer.is_complete());
        assert!(observer.collect_observations().is_empty());
    }

    #[test]
    fn recording_splits_per_camera() {
        let json = r#"{
            "scenes": [
                {"scene_id": 1, "cameras": {"left": [{"target": "board", "point_id": 0, "x": 1.0, "y": 2.0}]}},
                {"scene_id": 2, "cameras": {"left": [], "right": [{"target": "board", "point_id": 3, "x": 5.0, "y": 6.0}]}}
            ]
        }"#;
        let recorded: RecordedObservations = serde_json::from_str(json).unwrap();
        let observers = recorded.into_observers();
        assert_eq!(observers.len(), 2);
        assert_eq!(observers["left"].recorded.len(), 2);
        assert_eq!(observers["right"].recorded[&2][0].point_id, 3);
    }
}
