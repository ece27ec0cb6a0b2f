//! Calibration entities and the data exchanged with capture devices.
//!
//! Cameras and targets share the same notion of [`Motion`]: a static entity has
//! one pose for the whole job, a moving entity has one pose per scene it takes
//! part in. Scenes group the observation commands issued in one capture event.

mod camera;
mod distortion;
mod motion;
mod observation;
mod pose;
mod scene;
mod target;

pub use camera::*;
pub use distortion::*;
pub use motion::*;
pub use observation::*;
pub use pose::*;
pub use scene::*;
pub use target::*;
