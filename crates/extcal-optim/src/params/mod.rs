//! Conversions between calibration entities and solver parameter vectors.
//!
//! - [`intrinsics::pack_intrinsics`] / [`intrinsics::unpack_intrinsics`]: `[fx, fy, cx, cy, k1, k2, k3, p1, p2]`
//! - [`pose::pack_pose`] / [`pose::unpack_pose`]: `[ax, ay, az, tx, ty, tz]`
//! - [`pose::pack_point`] / [`pose::unpack_point`]: `[x, y, z]`

pub mod intrinsics;
pub mod pose;

pub use intrinsics::{pack_intrinsics, unpack_intrinsics};
pub use pose::{pack_point, pack_pose, unpack_point, unpack_pose};
