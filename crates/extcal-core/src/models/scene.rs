use serde::{Deserialize, Serialize};

use crate::Real;

/// Identifier of a capture event. Scenes are processed in ascending id order.
pub type SceneId = u32;

/// Axis-aligned image region, bounds inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub x_min: Real,
    pub x_max: Real,
    pub y_min: Real,
    pub y_max: Real,
}

impl Roi {
    pub fn new(x_min: Real, x_max: Real, y_min: Real, y_max: Real) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    /// Region that accepts every finite pixel.
    pub fn unbounded() -> Self {
        Self::new(Real::MIN, Real::MAX, Real::MIN, Real::MAX)
    }

    pub fn is_valid(&self) -> bool {
        self.x_min <= self.x_max && self.y_min <= self.y_max
    }

    pub fn contains(&self, x: Real, y: Real) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }
}

/// How a scene's capture is triggered. Interpreted by the capture device.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub trigger_type: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// "Camera C should look for target T within ROI R" for one scene.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObservationCommand {
    pub camera: String,
    pub target: String,
    pub roi: Roi,
}

/// One capture event: its trigger and the observation commands issued in it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: SceneId,
    #[serde(default)]
    pub trigger: TriggerConfig,
    pub commands: Vec<ObservationCommand>,
}

impl Scene {
    pub fn new(id: SceneId, trigger: TriggerConfig) -> Self {
        Self {
            id,
            trigger,
            commands: Vec::new(),
        }
    }

    pub fn with_command(
        mut self,
        camera: impl Into<String>,
        target: impl Into<String>,
        roi: Roi,
    ) -> Self {
        self.commands.push(ObservationCommand {
            camera: camera.into(),
            target: target.into(),
            roi,
        });
        self
    }

    /// Distinct participating cameras in order of first mention.
    pub fn cameras(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for cmd in &self.commands {
            if !names.contains(&cmd.camera.as_str()) {
                names.push(cmd.camera.as_str());
            }
        }
        names
    }
}
