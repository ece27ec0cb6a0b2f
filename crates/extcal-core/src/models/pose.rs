use nalgebra::{Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

use crate::{all_finite, Iso3, Pt3, Real, Vec3};

/// Rigid transform parameterized as an axis-angle rotation and a translation.
///
/// The rotation vector direction is the rotation axis and its norm is the
/// rotation angle in radians. Applying the pose maps `p` to `R(angle_axis) p + position`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose6 {
    pub angle_axis: [Real; 3],
    pub position: [Real; 3],
}

impl Pose6 {
    pub const DIM: usize = 6;

    pub fn new(angle_axis: [Real; 3], position: [Real; 3]) -> Self {
        Self {
            angle_axis,
            position,
        }
    }

    pub fn identity() -> Self {
        Self::default()
    }

    /// Parameters in `[ax, ay, az, tx, ty, tz]` order.
    pub fn to_array(&self) -> [Real; 6] {
        let [ax, ay, az] = self.angle_axis;
        let [tx, ty, tz] = self.position;
        [ax, ay, az, tx, ty, tz]
    }

    /// Inverse of [`Pose6::to_array`]. Returns `None` unless `values` has six entries.
    pub fn from_slice(values: &[Real]) -> Option<Self> {
        match values {
            [ax, ay, az, tx, ty, tz] => Some(Self::new([*ax, *ay, *az], [*tx, *ty, *tz])),
            _ => None,
        }
    }

    pub fn is_finite(&self) -> bool {
        all_finite(&self.to_array())
    }

    pub fn to_iso3(&self) -> Iso3 {
        let rotation = UnitQuaternion::from_scaled_axis(Vec3::from(self.angle_axis));
        let [tx, ty, tz] = self.position;
        Iso3::from_parts(Translation3::new(tx, ty, tz), rotation)
    }

    pub fn from_iso3(iso: &Iso3) -> Self {
        let aa = iso.rotation.scaled_axis();
        let t = iso.translation.vector;
        Self::new([aa.x, aa.y, aa.z], [t.x, t.y, t.z])
    }

    pub fn transform_point(&self, p: &Pt3) -> Pt3 {
        self.to_iso3().transform_point(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_roundtrip_preserves_transform() {
        let pose = Pose6::new([0.1, -0.2, 0.05], [0.3, 0.0, 1.5]);
        let back = Pose6::from_iso3(&pose.to_iso3());
        for (a, b) in pose.to_array().iter().zip(back.to_array()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn quarter_turn_about_z() {
        let pose = Pose6::new([0.0, 0.0, std::f64::consts::FRAC_PI_2], [1.0, 0.0, 0.0]);
        let p = pose.transform_point(&Pt3::new(1.0, 0.0, 0.0));
        assert!((p - Pt3::new(1.0, 1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(Pose6::from_slice(&[0.0; 5]).is_none());
        assert_eq!(Pose6::from_slice(&[0.0; 6]), Some(Pose6::identity()));
    }
}
