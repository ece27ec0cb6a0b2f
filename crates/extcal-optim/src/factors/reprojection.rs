//! Reprojection residuals for the camera / target-pose / point chain.
//!
//! Transform chain: `P_camera = extrinsics * target_pose * P_target`, where
//! `target_pose` maps target-frame points into the reference frame and
//! `extrinsics` maps reference-frame points into the camera frame. Both poses
//! are stored as `[ax, ay, az, tx, ty, tz]`.

use anyhow::{ensure, Result};
use nalgebra::{DVector, RealField, SVector, Vector2, Vector3};

use crate::ir::FactorKind;
use crate::math::{project_distorted, project_pinhole, transform_point};

pub const INTRINSICS_DIM: usize = 9;
pub const POSE_DIM: usize = 6;
pub const POINT_DIM: usize = 3;

fn constant<T: RealField>(v: f64) -> T {
    T::from_f64(v).unwrap()
}

fn vec3_from_block<T: RealField>(v: &DVector<T>, offset: usize) -> Vector3<T> {
    Vector3::new(
        v[offset].clone(),
        v[offset + 1].clone(),
        v[offset + 2].clone(),
    )
}

fn vec3_constant<T: RealField>(v: &[f64]) -> Vector3<T> {
    Vector3::new(constant(v[0]), constant(v[1]), constant(v[2]))
}

/// Rigid pose split into rotation vector and translation.
struct Pose<T: RealField> {
    aa: Vector3<T>,
    t: Vector3<T>,
}

impl<T: RealField> Pose<T> {
    fn from_block(v: &DVector<T>) -> Self {
        Self {
            aa: vec3_from_block(v, 0),
            t: vec3_from_block(v, 3),
        }
    }

    fn constant(v: &[f64; 6]) -> Self {
        Self {
            aa: vec3_constant(&v[0..3]),
            t: vec3_constant(&v[3..6]),
        }
    }

    fn apply(&self, p: &Vector3<T>) -> Vector3<T> {
        transform_point(&self.aa, &self.t, p)
    }
}

/// Camera model seen by a residual: either the full distorted model taken from
/// a parameter block or a constant distortion-free pinhole.
enum Lens<T: RealField> {
    Distorted([T; 9]),
    Pinhole([T; 4]),
}

impl<T: RealField> Lens<T> {
    fn from_block(v: &DVector<T>) -> Self {
        Lens::Distorted(std::array::from_fn(|i| v[i].clone()))
    }

    fn pinhole(k: &[f64; 4]) -> Self {
        Lens::Pinhole(k.map(constant))
    }

    fn project(&self, p_cam: &Vector3<T>) -> Vector2<T> {
        match self {
            Lens::Distorted(intr) => project_distorted(intr, p_cam),
            Lens::Pinhole(k) => project_pinhole(k, p_cam),
        }
    }
}

fn residual<T: RealField>(
    lens: &Lens<T>,
    extrinsics: &Pose<T>,
    target_pose: &Pose<T>,
    point: &Vector3<T>,
    uv: [f64; 2],
) -> SVector<T, 2> {
    let p_ref = target_pose.apply(point);
    let p_cam = extrinsics.apply(&p_ref);
    let proj = lens.project(&p_cam);
    let u_meas: T = constant(uv[0]);
    let v_meas: T = constant(uv[1]);
    SVector::<T, 2>::new(u_meas - proj.x.clone(), v_meas - proj.y.clone())
}

impl FactorKind {
    /// Generic residual `[u_meas - u_pred, v_meas - v_pred]` for backend adapters.
    ///
    /// `params` must match [`FactorKind::param_dims`]; callers validate the IR first.
    pub(crate) fn residual_generic<T: RealField>(&self, params: &[DVector<T>]) -> SVector<T, 2> {
        match self {
            FactorKind::ReprojFull { uv } => residual(
                &Lens::from_block(&params[0]),
                &Pose::from_block(&params[1]),
                &Pose::from_block(&params[2]),
                &vec3_from_block(&params[3], 0),
                *uv,
            ),
            FactorKind::ReprojPointFixed { uv, point } => residual(
                &Lens::from_block(&params[0]),
                &Pose::from_block(&params[1]),
                &Pose::from_block(&params[2]),
                &vec3_constant(point),
                *uv,
            ),
            FactorKind::ReprojIntrinsicsFixed { uv, k } => residual(
                &Lens::pinhole(k),
                &Pose::from_block(&params[0]),
                &Pose::from_block(&params[1]),
                &vec3_from_block(&params[2], 0),
                *uv,
            ),
            FactorKind::ReprojIntrinsicsPointFixed { uv, k, point } => residual(
                &Lens::pinhole(k),
                &Pose::from_block(&params[0]),
                &Pose::from_block(&params[1]),
                &vec3_constant(point),
                *uv,
            ),
            FactorKind::ReprojCameraOnly {
                uv,
                k,
                point,
                target_pose,
            } => residual(
                &Lens::pinhole(k),
                &Pose::from_block(&params[0]),
                &Pose::constant(target_pose),
                &vec3_constant(point),
                *uv,
            ),
        }
    }

    /// Evaluate the residual in `f64`, checking block dimensions.
    pub fn evaluate(&self, params: &[DVector<f64>]) -> Result<Vector2<f64>> {
        let dims = self.param_dims();
        ensure!(
            params.len() == dims.len(),
            "{:?} expects {} parameter blocks, got {}",
            self,
            dims.len(),
            params.len()
        );
        for (slot, (p, dim)) in params.iter().zip(dims).enumerate() {
            ensure!(
                p.len() == *dim,
                "parameter block {} has dim {}, expected {}",
                slot,
                p.len(),
                dim
            );
        }
        Ok(self.residual_generic(params))
    }
}
