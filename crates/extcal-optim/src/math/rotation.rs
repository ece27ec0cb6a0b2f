use nalgebra::{RealField, Vector3};

/// Rotate `p` by the axis-angle vector `aa` (Rodrigues' formula).
///
/// Near zero rotation the first-order expansion `p + aa x p` is used so that
/// derivatives stay well defined at the identity.
pub fn angle_axis_rotate_point<T: RealField>(aa: &Vector3<T>, p: &Vector3<T>) -> Vector3<T> {
    let theta2 = aa.dot(aa);
    let eps = T::from_f64(f64::EPSILON).unwrap();
    if theta2 > eps {
        let theta = theta2.sqrt();
        let cos_t = theta.clone().cos();
        let sin_t = theta.clone().sin();
        let w = aa / theta;
        let w_cross_p = w.cross(p);
        let w_dot_p = w.dot(p);
        p * cos_t.clone() + w_cross_p * sin_t + w * (w_dot_p * (T::one() - cos_t))
    } else {
        p + aa.cross(p)
    }
}

/// Apply the rigid transform `(aa, t)` to `p`: `R(aa) p + t`.
pub fn transform_point<T: RealField>(
    aa: &Vector3<T>,
    t: &Vector3<T>,
    p: &Vector3<T>,
) -> Vector3<T> {
    angle_axis_rotate_point(aa, p) + t
}
