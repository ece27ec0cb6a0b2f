use serde::{Deserialize, Serialize};

use crate::{Pt2, Real};

/// Pixel location of one known target point, as reported by a capture device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointObservation {
    pub target: String,
    pub point_id: usize,
    pub x: Real,
    pub y: Real,
}

impl PointObservation {
    pub fn new(target: impl Into<String>, point_id: usize, pixel: Pt2) -> Self {
        Self {
            target: target.into(),
            point_id,
            x: pixel.x,
            y: pixel.y,
        }
    }

    pub fn pixel(&self) -> Pt2 {
        Pt2::new(self.x, self.y)
    }
}
