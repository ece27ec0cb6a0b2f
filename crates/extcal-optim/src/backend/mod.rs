//! Solver backends for [`ProblemIR`].
//!
//! Backends translate the IR into solver-native graphs, apply fixed masks and
//! bounds, and return the solved parameter map together with a
//! [`SolveSummary`]. A backend only returns `Err` when the problem cannot be
//! posed at all; a solver run that fails numerically is reported through
//! [`Termination`].

mod tiny_solver_backend;

use anyhow::Result;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ir::ProblemIR;

pub use tiny_solver_backend::TinySolverBackend;

/// Solver settings shared by all backends; `None` keeps the backend default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSolveOptions {
    pub max_iters: usize,
    pub verbosity: usize,
    pub linear_solver: Option<LinearSolverKind>,
    /// Stop when the cost drops by less than this between iterations.
    pub min_abs_decrease: Option<f64>,
    /// Same as `min_abs_decrease`, relative to the current cost.
    pub min_rel_decrease: Option<f64>,
    /// Stop once the cost falls below this value.
    pub min_error: Option<f64>,
}

impl Default for BackendSolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 100,
            verbosity: 0,
            linear_solver: Some(LinearSolverKind::SparseCholesky),
            min_abs_decrease: Some(1e-5),
            min_rel_decrease: Some(1e-5),
            min_error: Some(1e-10),
        }
    }
}

/// Sparse factorisation used for the normal equations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearSolverKind {
    SparseCholesky,
    #[serde(rename = "sparse_qr")]
    SparseQR,
}

/// Why the optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// A termination criterion was met with a finite cost.
    Converged,
    /// Iteration budget exhausted before any criterion was met.
    NoConvergence,
    /// Linear solve failure or non-finite cost.
    NumericalFailure,
}

/// Outcome of one optimizer run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveSummary {
    pub termination: Termination,
    /// Iterations performed, when the backend reports them.
    pub iterations: Option<usize>,
    /// `0.5 * sum ||r||^2` at the initial values.
    pub initial_cost: f64,
    /// `0.5 * sum ||r||^2` at the returned values.
    pub final_cost: f64,
    pub num_residuals: usize,
    pub num_free_params: usize,
    pub message: String,
}

impl SolveSummary {
    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }

    /// Root-mean-square pixel error implied by `final_cost`.
    pub fn rms_error(&self) -> f64 {
        if self.num_residuals == 0 {
            0.0
        } else {
            (2.0 * self.final_cost / self.num_residuals as f64).sqrt()
        }
    }
}

/// Solved values keyed by IR block name, plus the run summary.
#[derive(Debug, Clone)]
pub struct BackendSolution {
    pub params: HashMap<String, DVector<f64>>,
    pub summary: SolveSummary,
}

/// A non-linear least-squares solver that can run a [`ProblemIR`].
pub trait OptimBackend {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &'static str;

    /// Solve `ir` starting from `initial`, keyed by block name.
    fn solve(
        &self,
        ir: &ProblemIR,
        initial: &HashMap<String, DVector<f64>>,
        opts: &BackendSolveOptions,
    ) -> Result<BackendSolution>;
}
