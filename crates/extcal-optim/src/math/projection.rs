use nalgebra::{RealField, Vector2, Vector3};

fn normalize<T: RealField>(p_cam: &Vector3<T>) -> (T, T) {
    let eps = T::from_f64(1e-12).unwrap();
    let z = if p_cam.z.clone() > eps.clone() {
        p_cam.z.clone()
    } else {
        eps
    };
    (p_cam.x.clone() / z.clone(), p_cam.y.clone() / z)
}

/// Brown-Conrady distortion of a normalized coordinate, `dist = [k1, k2, k3, p1, p2]`.
pub fn distort_brown_conrady<T: RealField>(x: T, y: T, dist: &[T; 5]) -> (T, T) {
    let [k1, k2, k3, p1, p2] = dist.clone();
    let two = T::from_f64(2.0).unwrap();

    let r2 = x.clone() * x.clone() + y.clone() * y.clone();
    let r4 = r2.clone() * r2.clone();
    let r6 = r4.clone() * r2.clone();
    let radial = T::one() + k1 * r2.clone() + k2 * r4 + k3 * r6;

    let xy = x.clone() * y.clone();
    let x_tan = two.clone() * p1.clone() * xy.clone()
        + p2.clone() * (r2.clone() + two.clone() * x.clone() * x.clone());
    let y_tan = p1 * (r2 + two.clone() * y.clone() * y.clone()) + two * p2 * xy;

    (x * radial.clone() + x_tan, y * radial + y_tan)
}

/// Project a camera-frame point with `intr = [fx, fy, cx, cy, k1, k2, k3, p1, p2]`.
pub fn project_distorted<T: RealField>(intr: &[T; 9], p_cam: &Vector3<T>) -> Vector2<T> {
    let [fx, fy, cx, cy, k1, k2, k3, p1, p2] = intr.clone();
    let (x, y) = normalize(p_cam);
    let (xd, yd) = distort_brown_conrady(x, y, &[k1, k2, k3, p1, p2]);
    Vector2::new(fx * xd + cx, fy * yd + cy)
}

/// Distortion-free projection with `k = [fx, fy, cx, cy]`.
pub fn project_pinhole<T: RealField>(k: &[T; 4], p_cam: &Vector3<T>) -> Vector2<T> {
    let [fx, fy, cx, cy] = k.clone();
    let (x, y) = normalize(p_cam);
    Vector2::new(fx * x + cx, fy * y + cy)
}
