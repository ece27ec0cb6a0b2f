use serde::{Deserialize, Serialize};

use crate::{Real, Vec2};

/// Brown-Conrady lens distortion with three radial and two tangential terms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BrownConrady5 {
    pub k1: Real,
    pub k2: Real,
    pub k3: Real,
    pub p1: Real,
    pub p2: Real,
}

impl BrownConrady5 {
    pub fn new(k1: Real, k2: Real, k3: Real, p1: Real, p2: Real) -> Self {
        Self { k1, k2, k3, p1, p2 }
    }

    pub fn is_zero(&self) -> bool {
        self.to_array().iter().all(|v| *v == 0.0)
    }

    /// Coefficients in `[k1, k2, k3, p1, p2]` order.
    pub fn to_array(&self) -> [Real; 5] {
        [self.k1, self.k2, self.k3, self.p1, self.p2]
    }

    /// Apply distortion to an undistorted normalized image coordinate.
    pub fn distort(&self, n_undist: &Vec2) -> Vec2 {
        let (x, y) = (n_undist.x, n_undist.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;

        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;

        Vec2::new(x * radial + x_tan, y * radial + y_tan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_coefficients_are_identity() {
        let d = BrownConrady5::default();
        let p = Vec2::new(0.3, -0.2);
        assert!(d.is_zero());
        assert_eq!(d.distort(&p), p);
    }

    #[test]
    fn radial_term_scales_with_radius() {
        let d = BrownConrady5::new(0.1, 0.0, 0.0, 0.0, 0.0);
        let p = Vec2::new(0.5, 0.0);
        let out = d.distort(&p);
        assert!((out.x - 0.5 * (1.0 + 0.1 * 0.25)).abs() < 1e-12);
        assert_eq!(out.y, 0.0);
    }
}
