use anyhow::{anyhow, bail, ensure, Context, Result};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::factors::reprojection::{INTRINSICS_DIM, POINT_DIM, POSE_DIM};

/// Index of a parameter block inside its [`ProblemIR`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(pub usize);

/// Box constraint on one scalar of a block, enforced by the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bound {
    pub idx: usize,
    pub lower: f64,
    pub upper: f64,
}

/// Scalars of a block held constant during optimization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedMask(BTreeSet<usize>);

impl FixedMask {
    pub fn all_free() -> Self {
        Self::default()
    }

    pub fn all_fixed(dim: usize) -> Self {
        Self((0..dim).collect())
    }

    pub fn is_fixed(&self, idx: usize) -> bool {
        self.0.contains(&idx)
    }

    /// `true` when every index in `0..dim` is held.
    pub fn is_all_fixed(&self, dim: usize) -> bool {
        (0..dim).all(|idx| self.0.contains(&idx))
    }

    /// Fixed indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }
}

/// Robust loss applied to a residual block.
///
/// Each observation becomes its own residual block, so the loss acts per point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RobustLoss {
    #[default]
    None,
    Huber {
        scale: f64,
    },
    Cauchy {
        scale: f64,
    },
    Arctan {
        scale: f64,
    },
}

/// Reprojection factor kinds.
///
/// Every kind predicts the pixel of one target point through the chain
/// `pixel = project(intrinsics, extrinsics * target_pose * point)` and differs
/// only in which of those quantities are parameter blocks and which are baked
/// into the factor as constants.
#[derive(Debug, Clone, PartialEq)]
pub enum FactorKind {
    /// Parameters: [intrinsics(9), extrinsics(6), target_pose(6), point(3)].
    ReprojFull { uv: [f64; 2] },
    /// Parameters: [intrinsics(9), extrinsics(6), target_pose(6)].
    ReprojPointFixed { uv: [f64; 2], point: [f64; 3] },
    /// Distortion-free pinhole `k = [fx, fy, cx, cy]` held constant.
    ///
    /// Parameters: [extrinsics(6), target_pose(6), point(3)].
    ReprojIntrinsicsFixed { uv: [f64; 2], k: [f64; 4] },
    /// Parameters: [extrinsics(6), target_pose(6)].
    ReprojIntrinsicsPointFixed {
        uv: [f64; 2],
        k: [f64; 4],
        point: [f64; 3],
    },
    /// Only the camera extrinsics are estimated.
    ///
    /// Parameters: [extrinsics(6)].
    ReprojCameraOnly {
        uv: [f64; 2],
        k: [f64; 4],
        point: [f64; 3],
        target_pose: [f64; 6],
    },
}

impl FactorKind {
    /// Residual dimension implied by the factor.
    pub fn residual_dim(&self) -> usize {
        2
    }

    /// Expected dimension of each parameter block, in order.
    pub fn param_dims(&self) -> &'static [usize] {
        match self {
            FactorKind::ReprojFull { .. } => &[INTRINSICS_DIM, POSE_DIM, POSE_DIM, POINT_DIM],
            FactorKind::ReprojPointFixed { .. } => &[INTRINSICS_DIM, POSE_DIM, POSE_DIM],
            FactorKind::ReprojIntrinsicsFixed { .. } => &[POSE_DIM, POSE_DIM, POINT_DIM],
            FactorKind::ReprojIntrinsicsPointFixed { .. } => &[POSE_DIM, POSE_DIM],
            FactorKind::ReprojCameraOnly { .. } => &[POSE_DIM],
        }
    }
}

/// One optimizable vector, addressed by `name` in value maps.
///
/// All blocks are Euclidean; poses are axis-angle plus translation.
#[derive(Debug, Clone)]
pub struct ParamBlock {
    pub id: ParamId,
    pub name: String,
    pub dim: usize,
    pub fixed: FixedMask,
    pub bounds: Option<Vec<Bound>>,
}

/// One reprojection term; `params` follow [`FactorKind::param_dims`].
#[derive(Debug, Clone)]
pub struct ResidualBlock {
    pub params: Vec<ParamId>,
    pub loss: RobustLoss,
    pub factor: FactorKind,
    pub residual_dim: usize,
}

/// Solver-independent least-squares problem.
#[derive(Debug, Default, Clone)]
pub struct ProblemIR {
    pub params: Vec<ParamBlock>,
    pub residuals: Vec<ResidualBlock>,
}

impl ProblemIR {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_param_block(
        &mut self,
        name: impl Into<String>,
        dim: usize,
        fixed: FixedMask,
        bounds: Option<Vec<Bound>>,
    ) -> ParamId {
        let block = ParamBlock {
            id: ParamId(self.params.len()),
            name: name.into(),
            dim,
            fixed,
            bounds,
        };
        let id = block.id;
        self.params.push(block);
        id
    }

    pub fn add_residual_block(&mut self, residual: ResidualBlock) {
        self.residuals.push(residual);
    }

    pub fn param_by_name(&self, name: &str) -> Option<ParamId> {
        self.params.iter().find(|p| p.name == name).map(|p| p.id)
    }

    /// Number of free scalar parameters.
    pub fn num_free_params(&self) -> usize {
        self.params
            .iter()
            .map(|p| (0..p.dim).filter(|i| !p.fixed.is_fixed(*i)).count())
            .sum()
    }

    /// Check block ids, names, masks, bounds and residual wiring.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for (idx, block) in self.params.iter().enumerate() {
            ensure!(
                block.id == ParamId(idx),
                "block `{}` stored at {idx} has id {:?}",
                block.name,
                block.id
            );
            ensure!(
                names.insert(block.name.as_str()),
                "block name `{}` used twice",
                block.name
            );
            validate_block(block)?;
        }
        for (idx, residual) in self.residuals.iter().enumerate() {
            self.validate_residual(residual)
                .with_context(|| format!("residual {idx}"))?;
        }
        Ok(())
    }

    fn validate_residual(&self, residual: &ResidualBlock) -> Result<()> {
        let dims = residual.factor.param_dims();
        ensure!(
            residual.residual_dim == residual.factor.residual_dim(),
            "declares {} rows, factor produces {}",
            residual.residual_dim,
            residual.factor.residual_dim()
        );
        ensure!(
            residual.params.len() == dims.len(),
            "{:?} takes {} blocks, got {}",
            residual.factor,
            dims.len(),
            residual.params.len()
        );
        for (id, &dim) in residual.params.iter().zip(dims) {
            let Some(block) = self.params.get(id.0) else {
                bail!("unknown block {:?}", id);
            };
            ensure!(
                block.dim == dim,
                "block `{}` has dim {}, factor slot needs {dim}",
                block.name,
                block.dim
            );
        }
        Ok(())
    }

    /// Evaluate every residual at `values` (keyed by block name).
    pub fn evaluate_residuals(
        &self,
        values: &HashMap<String, DVector<f64>>,
    ) -> Result<Vec<[f64; 2]>> {
        self.residuals
            .iter()
            .map(|residual| {
                let params = residual
                    .params
                    .iter()
                    .map(|id| {
                        let name = &self.params[id.0].name;
                        values
                            .get(name)
                            .cloned()
                            .ok_or_else(|| anyhow!("missing value for param {}", name))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let r = residual.factor.evaluate(&params)?;
                Ok([r.x, r.y])
            })
            .collect()
    }

    /// Unrobustified cost `0.5 * sum ||r||^2`.
    pub fn evaluate_cost(&self, values: &HashMap<String, DVector<f64>>) -> Result<f64> {
        let residuals = self.evaluate_residuals(values)?;
        Ok(0.5 * residuals.iter().map(|[u, v]| u * u + v * v).sum::<f64>())
    }
}

fn validate_block(block: &ParamBlock) -> Result<()> {
    if let Some(idx) = block.fixed.iter().find(|&idx| idx >= block.dim) {
        bail!("block `{}`: fixed index {idx} outside dim {}", block.name, block.dim);
    }
    for bound in block.bounds.iter().flatten() {
        ensure!(
            bound.idx < block.dim && bound.lower <= bound.upper,
            "block `{}`: invalid bound {:?}",
            block.name,
            bound
        );
    }
    Ok(())
}
