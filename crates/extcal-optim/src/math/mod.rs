//! Rotation and projection helpers generic over the scalar type.

mod projection;
mod rotation;

pub use projection::{distort_brown_conrady, project_distorted, project_pinhole};
pub use rotation::{angle_axis_rotate_point, transform_point};
