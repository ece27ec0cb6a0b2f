//! Bundle assembler: one reprojection residual per observation log entry.
//!
//! Which buffers are optimized is decided per entry from the effective fix
//! flags of its camera and target (job-wide [`FixPolicy`] overridden by
//! per-entity flags), see [`ResidualVariant::select`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use extcal_optim::backend::{BackendSolveOptions, OptimBackend, SolveSummary};
use extcal_optim::ir::{
    Bound, FactorKind, FixedMask, ParamId, ProblemIR, ResidualBlock, RobustLoss,
};
use log::{debug, info, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::{OptimizationError, RegistryError};
use crate::observation_log::{ObservationEntry, ObservationLog};
use crate::registry::{BlockKind, EntityRegistry, ParamHandle};

/// Job-wide default of which quantities are held constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixPolicy {
    pub intrinsics: bool,
    pub target_points: bool,
    pub target_pose: bool,
}

impl Default for FixPolicy {
    fn default() -> Self {
        Self {
            intrinsics: true,
            target_points: true,
            target_pose: false,
        }
    }
}

/// Residual formulation of one log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualVariant {
    /// Intrinsics, extrinsics, target pose and point optimized.
    Full,
    /// Point baked in.
    PointFixed,
    /// Pinhole intrinsics baked in (rectified images, no distortion).
    IntrinsicsFixed,
    /// Pinhole intrinsics and point baked in.
    IntrinsicsPointFixed,
    /// Only extrinsics optimized.
    CameraOnly,
}

impl ResidualVariant {
    /// Pick the variant for the effective fix flags. The second value is `true`
    /// when the target pose must be passed as a held-constant block.
    pub fn select(fix_intrinsics: bool, fix_points: bool, fix_pose: bool) -> (Self, bool) {
        match (fix_intrinsics, fix_points, fix_pose) {
            (true, true, true) => (ResidualVariant::CameraOnly, false),
            (false, false, pose) => (ResidualVariant::Full, pose),
            (false, true, pose) => (ResidualVariant::PointFixed, pose),
            (true, false, pose) => (ResidualVariant::IntrinsicsFixed, pose),
            (true, true, pose) => (ResidualVariant::IntrinsicsPointFixed, pose),
        }
    }

    /// `true` for variants that bake in a distortion-free pinhole.
    pub fn is_pinhole(self) -> bool {
        !matches!(self, ResidualVariant::Full | ResidualVariant::PointFixed)
    }
}

/// IR plus the bookkeeping needed to write solved values back.
#[derive(Debug, Clone)]
pub struct AssembledProblem {
    pub ir: ProblemIR,
    pub initial: HashMap<String, DVector<f64>>,
    /// Residual count per variant.
    pub variants: BTreeMap<ResidualVariant, usize>,
    /// Cameras with configured distortion that a pinhole variant ignores.
    pub pinhole_with_distortion: BTreeSet<String>,
    bindings: Vec<(ParamHandle, bool)>,
}

impl AssembledProblem {
    /// Registry handle behind an IR block and whether it is held constant.
    pub fn binding(&self, id: ParamId) -> Option<(ParamHandle, bool)> {
        self.bindings.get(id.0).copied()
    }

    /// Copy solved values of every free block into the registry.
    pub fn write_back(
        &self,
        registry: &mut EntityRegistry,
        solved: &HashMap<String, DVector<f64>>,
    ) -> Result<usize, RegistryError> {
        let mut written = 0;
        for (block, (handle, fixed)) in self.ir.params.iter().zip(&self.bindings) {
            if *fixed {
                continue;
            }
            if let Some(values) = solved.get(&block.name) {
                registry.set_values(*handle, values)?;
                written += 1;
            }
        }
        Ok(written)
    }
}

struct IrBuilder<'r> {
    registry: &'r EntityRegistry,
    ir: ProblemIR,
    initial: HashMap<String, DVector<f64>>,
    ids: HashMap<ParamHandle, ParamId>,
    bindings: Vec<(ParamHandle, bool)>,
}

impl<'r> IrBuilder<'r> {
    fn new(registry: &'r EntityRegistry) -> Self {
        Self {
            registry,
            ir: ProblemIR::new(),
            initial: HashMap::new(),
            ids: HashMap::new(),
            bindings: Vec::new(),
        }
    }

    fn block(&mut self, handle: ParamHandle, fixed: bool) -> Result<ParamId, RegistryError> {
        if let Some(id) = self.ids.get(&handle) {
            return Ok(*id);
        }
        let registry = self.registry;
        let buffer = registry
            .buffer(handle)
            .ok_or(RegistryError::UnknownHandle(handle.index()))?;
        let dim = buffer.kind().dim();
        let mask = if fixed {
            FixedMask::all_fixed(dim)
        } else {
            FixedMask::all_free()
        };
        // Keep focal lengths positive while free.
        let bounds = (buffer.kind() == BlockKind::Intrinsics && !fixed).then(|| {
            vec![
                Bound {
                    idx: 0,
                    lower: 1.0,
                    upper: f64::MAX,
                },
                Bound {
                    idx: 1,
                    lower: 1.0,
                    upper: f64::MAX,
                },
            ]
        });
        let id = self.ir.add_param_block(buffer.label(), dim, mask, bounds);
        self.initial
            .insert(buffer.label().to_string(), buffer.values().clone());
        self.ids.insert(handle, id);
        self.bindings.push((handle, fixed));
        Ok(id)
    }

    fn values(&self, handle: ParamHandle) -> Result<&DVector<f64>, RegistryError> {
        self.registry
            .values(handle)
            .ok_or(RegistryError::UnknownHandle(handle.index()))
    }

    fn pinhole(&self, handle: ParamHandle) -> Result<[f64; 4], RegistryError> {
        let v = self.values(handle)?;
        Ok([v[0], v[1], v[2], v[3]])
    }

    fn has_distortion(&self, handle: ParamHandle) -> Result<bool, RegistryError> {
        let v = self.values(handle)?;
        Ok(v.iter().skip(4).any(|c| *c != 0.0))
    }

    fn point(&self, handle: ParamHandle) -> Result<[f64; 3], RegistryError> {
        let v = self.values(handle)?;
        Ok([v[0], v[1], v[2]])
    }

    fn pose(&self, handle: ParamHandle) -> Result<[f64; 6], RegistryError> {
        let v = self.values(handle)?;
        Ok([v[0], v[1], v[2], v[3], v[4], v[5]])
    }
}

/// Builds and solves the bundle for an observation log.
#[derive(Debug, Clone, Default)]
pub struct BundleAssembler {
    pub fix: FixPolicy,
    pub robust_loss: RobustLoss,
}

impl BundleAssembler {
    pub fn new(fix: FixPolicy, robust_loss: RobustLoss) -> Self {
        Self { fix, robust_loss }
    }

    /// Effective flags `(intrinsics, points, pose)` for an entry.
    fn fix_flags(
        &self,
        registry: &EntityRegistry,
        entry: &ObservationEntry,
    ) -> Result<(bool, bool, bool), RegistryError> {
        let camera = registry.camera_by_name(&entry.camera)?;
        let target = registry.target_by_name(&entry.target)?;
        Ok((
            camera.fix_intrinsics.unwrap_or(self.fix.intrinsics),
            target.fix_points.unwrap_or(self.fix.target_points),
            target.fix_pose.unwrap_or(self.fix.target_pose),
        ))
    }

    pub fn variant_for(
        &self,
        registry: &EntityRegistry,
        entry: &ObservationEntry,
    ) -> Result<(ResidualVariant, bool), RegistryError> {
        let (intrinsics, points, pose) = self.fix_flags(registry, entry)?;
        Ok(ResidualVariant::select(intrinsics, points, pose))
    }

    fn add_entry(
        &self,
        builder: &mut IrBuilder<'_>,
        entry: &ObservationEntry,
    ) -> Result<ResidualVariant, RegistryError> {
        let (variant, hold_pose) = self.variant_for(builder.registry, entry)?;
        let b = entry.blocks;
        let uv = [entry.pixel.x, entry.pixel.y];

        let (factor, params) = match variant {
            ResidualVariant::Full => (
                FactorKind::ReprojFull { uv },
                vec![
                    builder.block(b.intrinsics, false)?,
                    builder.block(b.extrinsics, false)?,
                    builder.block(b.target_pose, hold_pose)?,
                    builder.block(b.point, false)?,
                ],
            ),
            ResidualVariant::PointFixed => (
                FactorKind::ReprojPointFixed {
                    uv,
                    point: builder.point(b.point)?,
                },
                vec![
                    builder.block(b.intrinsics, false)?,
                    builder.block(b.extrinsics, false)?,
                    builder.block(b.target_pose, hold_pose)?,
                ],
            ),
            ResidualVariant::IntrinsicsFixed => (
                FactorKind::ReprojIntrinsicsFixed {
                    uv,
                    k: builder.pinhole(b.intrinsics)?,
                },
                vec![
                    builder.block(b.extrinsics, false)?,
                    builder.block(b.target_pose, hold_pose)?,
                    builder.block(b.point, false)?,
                ],
            ),
            ResidualVariant::IntrinsicsPointFixed => (
                FactorKind::ReprojIntrinsicsPointFixed {
                    uv,
                    k: builder.pinhole(b.intrinsics)?,
                    point: builder.point(b.point)?,
                },
                vec![
                    builder.block(b.extrinsics, false)?,
                    builder.block(b.target_pose, hold_pose)?,
                ],
            ),
            ResidualVariant::CameraOnly => (
                FactorKind::ReprojCameraOnly {
                    uv,
                    k: builder.pinhole(b.intrinsics)?,
                    point: builder.point(b.point)?,
                    target_pose: builder.pose(b.target_pose)?,
                },
                vec![builder.block(b.extrinsics, false)?],
            ),
        };

        builder.ir.add_residual_block(ResidualBlock {
            params,
            loss: self.robust_loss,
            residual_dim: factor.residual_dim(),
            factor,
        });
        Ok(variant)
    }

    /// Build the problem IR: exactly one residual block per log entry.
    pub fn assemble(
        &self,
        registry: &EntityRegistry,
        log: &ObservationLog,
    ) -> Result<AssembledProblem, OptimizationError> {
        if log.is_empty() {
            return Err(OptimizationError::NoObservations);
        }
        log.check_integrity(registry)?;

        let mut builder = IrBuilder::new(registry);
        let mut variants: BTreeMap<ResidualVariant, usize> = BTreeMap::new();
        let mut pinhole_with_distortion = BTreeSet::new();
        for entry in log {
            let variant = self.add_entry(&mut builder, entry)?;
            *variants.entry(variant).or_default() += 1;
            if variant.is_pinhole()
                && !pinhole_with_distortion.contains(&entry.camera)
                && builder.has_distortion(entry.blocks.intrinsics)?
            {
                warn!(
                    "camera `{}` has non-zero distortion but intrinsics are fixed; \
                     solving with a distortion-free pinhole model",
                    entry.camera
                );
                pinhole_with_distortion.insert(entry.camera.clone());
            }
        }
        builder
            .ir
            .validate()
            .map_err(OptimizationError::InvalidProblem)?;

        debug!("residual variants: {:?}", variants);
        Ok(AssembledProblem {
            ir: builder.ir,
            initial: builder.initial,
            variants,
            pinhole_with_distortion,
            bindings: builder.bindings,
        })
    }

    /// Assemble, solve with `backend` and write the solution back into the
    /// registry. Non-converged runs leave the registry untouched and return
    /// [`OptimizationError::NotConverged`] carrying the summary.
    pub fn solve(
        &self,
        registry: &mut EntityRegistry,
        log: &ObservationLog,
        backend: &dyn OptimBackend,
        opts: &BackendSolveOptions,
    ) -> Result<SolveSummary, OptimizationError> {
        let problem = self.assemble(registry, log)?;
        info!(
            "solving bundle: {} residuals, {} blocks, {} free params ({})",
            problem.ir.residuals.len(),
            problem.ir.params.len(),
            problem.ir.num_free_params(),
            backend.name()
        );

        let solution = backend
            .solve(&problem.ir, &problem.initial, opts)
            .map_err(|error| OptimizationError::Backend {
                backend: backend.name(),
                error,
            })?;
        let summary = solution.summary;
        if !summary.converged() {
            return Err(OptimizationError::NotConverged { summary });
        }

        let written = problem.write_back(registry, &solution.params)?;
        info!(
            "bundle converged: cost {:.6e} -> {:.6e}, {} blocks updated",
            summary.initial_cost, summary.final_cost, written
        );
        Ok(summary)
    }

    /// Per-entry reprojection residuals `[du, dv]` at the current registry values,
    /// using the formulation each entry is assembled with.
    pub fn reprojection_residuals(
        &self,
        registry: &EntityRegistry,
        log: &ObservationLog,
    ) -> Result<Vec<[f64; 2]>, OptimizationError> {
        if log.is_empty() {
            return Ok(Vec::new());
        }
        let problem = self.assemble(registry, log)?;
        problem
            .ir
            .evaluate_residuals(&problem.initial)
            .map_err(OptimizationError::InvalidProblem)
    }
}
