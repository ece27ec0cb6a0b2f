//! Intrinsics parameter blocks.

use anyhow::{ensure, Result};
use extcal_core::CameraIntrinsics;
use nalgebra::{DVector, DVectorView};

/// Dense vector `[fx, fy, cx, cy, k1, k2, k3, p1, p2]`.
pub fn pack_intrinsics(intrinsics: &CameraIntrinsics) -> DVector<f64> {
    DVector::from_row_slice(&intrinsics.to_array())
}

pub fn unpack_intrinsics(v: DVectorView<'_, f64>) -> Result<CameraIntrinsics> {
    ensure!(
        v.len() == CameraIntrinsics::DIM,
        "expected intrinsics vector of length {}, got {}",
        CameraIntrinsics::DIM,
        v.len()
    );
    let values: Vec<f64> = v.iter().copied().collect();
    CameraIntrinsics::from_slice(&values)
        .ok_or_else(|| anyhow::anyhow!("malformed intrinsics vector"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use extcal_core::BrownConrady5;

    #[test]
    fn pack_unpack() {
        let k = CameraIntrinsics::pinhole(700.0, 701.0, 300.0, 200.0)
            .with_distortion(BrownConrady5::new(0.1, 0.2, 0.3, 0.4, 0.5));
        let v = pack_intrinsics(&k);
        assert_eq!(v.len(), 9);
        assert_eq!(unpack_intrinsics(v.as_view()).unwrap(), k);
    }

    #[test]
    fn unpack_rejects_short_vector() {
        let v = DVector::from_element(4, 1.0);
        assert!(unpack_intrinsics(v.as_view()).is_err());
    }
}
