//! Non-linear least-squares machinery for extrinsic calibration bundles.
//!
//! The crate is split into a backend-independent problem description
//! ([`ir::ProblemIR`]) and solver backends that compile it
//! ([`backend::TinySolverBackend`]). Reprojection residuals are written once,
//! generically over [`nalgebra::RealField`], so the same code serves plain
//! `f64` evaluation and automatic differentiation inside the solver.

pub mod backend;
pub mod factors;
pub mod ir;
pub mod math;
pub mod params;

pub use backend::{
    BackendSolution, BackendSolveOptions, LinearSolverKind, OptimBackend, SolveSummary,
    Termination, TinySolverBackend,
};
pub use ir::{
    Bound, FactorKind, FixedMask, ParamBlock, ParamId, ProblemIR, ResidualBlock, RobustLoss,
};
