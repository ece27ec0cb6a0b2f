use nalgebra::{Isometry3, Point2, Point3, Vector2, Vector3};

pub type Real = f64;

pub type Vec2 = Vector2<Real>;
pub type Vec3 = Vector3<Real>;
pub type Pt2 = Point2<Real>;
pub type Pt3 = Point3<Real>;
pub type Iso3 = Isometry3<Real>;

/// Returns `true` if every value in the slice is finite.
pub fn all_finite(values: &[Real]) -> bool {
    values.iter().all(|v| v.is_finite())
}
