//! Axis-angle pose and 3D point parameter blocks.

use anyhow::{ensure, Result};
use extcal_core::{Pose6, Pt3};
use nalgebra::{DVector, DVectorView};

/// Dense vector `[ax, ay, az, tx, ty, tz]`.
pub fn pack_pose(pose: &Pose6) -> DVector<f64> {
    DVector::from_row_slice(&pose.to_array())
}

pub fn unpack_pose(v: DVectorView<'_, f64>) -> Result<Pose6> {
    ensure!(
        v.len() == Pose6::DIM,
        "expected pose vector of length {}, got {}",
        Pose6::DIM,
        v.len()
    );
    Ok(Pose6::new([v[0], v[1], v[2]], [v[3], v[4], v[5]]))
}

pub fn pack_point(p: &Pt3) -> DVector<f64> {
    DVector::from_row_slice(&[p.x, p.y, p.z])
}

pub fn unpack_point(v: DVectorView<'_, f64>) -> Result<Pt3> {
    ensure!(v.len() == 3, "expected point vector of length 3, got {}", v.len());
    Ok(Pt3::new(v[0], v[1], v[2]))
}
