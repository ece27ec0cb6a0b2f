use crate::backend::{
    BackendSolution, BackendSolveOptions, LinearSolverKind, OptimBackend, SolveSummary,
    Termination,
};
use crate::ir::{FactorKind, ParamBlock, ProblemIR, RobustLoss};
use anyhow::{bail, ensure, Result};
use log::{debug, warn};
use nalgebra::DVector;
use std::collections::HashMap;
use tiny_solver::factors::Factor;
use tiny_solver::loss_functions::{ArctanLoss, CauchyLoss, HuberLoss, Loss};
use tiny_solver::optimizer::{Optimizer, OptimizerOptions};
use tiny_solver::problem::Problem;
use tiny_solver::{linear::sparse::LinearSolverType, LevenbergMarquardtOptimizer};

/// tiny-solver Levenberg-Marquardt backend adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct TinySolverBackend;

impl TinySolverBackend {
    fn compile(&self, ir: &ProblemIR, initial: &HashMap<String, DVector<f64>>) -> Result<Problem> {
        ir.validate()?;
        let mut problem = Problem::new();
        for param in &ir.params {
            declare_param(&mut problem, param, initial)?;
        }
        for residual in &ir.residuals {
            let names: Vec<&str> = residual
                .params
                .iter()
                .map(|id| ir.params[id.0].name.as_str())
                .collect();
            let factor = TinyReprojFactor {
                kind: residual.factor.clone(),
            };
            problem.add_residual_block(
                residual.residual_dim,
                &names,
                Box::new(factor),
                compile_loss(residual.loss)?,
            );
        }
        Ok(problem)
    }
}

/// Check the initial value of `param` and apply its fixed mask and bounds.
fn declare_param(
    problem: &mut Problem,
    param: &ParamBlock,
    initial: &HashMap<String, DVector<f64>>,
) -> Result<()> {
    let Some(values) = initial.get(&param.name) else {
        bail!("no initial value for parameter block `{}`", param.name);
    };
    ensure!(
        values.len() == param.dim,
        "parameter block `{}` has {} initial values, expected {}",
        param.name,
        values.len(),
        param.dim
    );
    for idx in param.fixed.iter() {
        problem.fix_variable(&param.name, idx);
    }
    for bound in param.bounds.iter().flatten() {
        problem.set_variable_bounds(&param.name, bound.idx, bound.lower, bound.upper);
    }
    Ok(())
}

impl OptimBackend for TinySolverBackend {
    fn name(&self) -> &'static str {
        "tiny-solver"
    }

    fn solve(
        &self,
        ir: &ProblemIR,
        initial: &HashMap<String, DVector<f64>>,
        opts: &BackendSolveOptions,
    ) -> Result<BackendSolution> {
        let problem = self.compile(ir, initial)?;
        let initial_cost = ir.evaluate_cost(initial)?;
        debug!(
            "tiny-solver: {} blocks, {} residuals, {} free params, initial cost {:.6e}",
            ir.params.len(),
            ir.residuals.len(),
            ir.num_free_params(),
            initial_cost
        );

        let optimizer = LevenbergMarquardtOptimizer::default();
        let options = to_optimizer_options(opts);

        let summary = |termination: Termination, final_cost: f64, message: String| SolveSummary {
            termination,
            iterations: None,
            initial_cost,
            final_cost,
            num_residuals: ir.residuals.len(),
            num_free_params: ir.num_free_params(),
            message,
        };

        let Some(solution) = optimizer.optimize(&problem, initial, Some(options.clone())) else {
            warn!("tiny-solver returned no solution");
            return Ok(BackendSolution {
                params: initial.clone(),
                summary: summary(
                    Termination::NumericalFailure,
                    initial_cost,
                    "linear solve failed or cost diverged".to_string(),
                ),
            });
        };

        let final_cost = ir.evaluate_cost(&solution)?;
        let (termination, message) = if !final_cost.is_finite() {
            (
                Termination::NumericalFailure,
                "non-finite final cost".to_string(),
            )
        } else {
            match stopping_reason(&optimizer, &problem, ir, &solution, final_cost, &options)? {
                Some(reason) => (
                    Termination::Converged,
                    format!(
                        "cost {:.6e} -> {:.6e} ({})",
                        initial_cost, final_cost, reason
                    ),
                ),
                None => (
                    Termination::NoConvergence,
                    format!(
                        "stopped at cost {:.6e} after at most {} iterations \
                         with the cost still decreasing",
                        final_cost, opts.max_iters
                    ),
                ),
            }
        };
        debug!("tiny-solver: {}", message);

        Ok(BackendSolution {
            params: solution,
            summary: summary(termination, final_cost, message),
        })
    }
}

/// Which stopping criterion holds at `solution`, if any.
///
/// tiny-solver returns the same map whether it stopped on a criterion or ran
/// out of iterations, so the criteria are re-checked with one extra LM step.
/// Errors are compared on the solver's own scale, `|r|^2 = 2 * cost`.
fn stopping_reason(
    optimizer: &LevenbergMarquardtOptimizer,
    problem: &Problem,
    ir: &ProblemIR,
    solution: &HashMap<String, DVector<f64>>,
    final_cost: f64,
    options: &OptimizerOptions,
) -> Result<Option<&'static str>> {
    let error = 2.0 * final_cost;
    if error <= 0.0 || error < options.min_error_threshold {
        return Ok(Some("error below threshold"));
    }
    let step = OptimizerOptions {
        max_iteration: 1,
        ..options.clone()
    };
    let Some(next) = optimizer.optimize(problem, solution, Some(step)) else {
        return Ok(None);
    };
    let next_error = 2.0 * ir.evaluate_cost(&next)?;
    if !next_error.is_finite() {
        return Ok(None);
    }
    let decrease = (error - next_error).abs();
    if next_error < options.min_error_threshold {
        Ok(Some("error below threshold"))
    } else if decrease < options.min_abs_error_decrease_threshold {
        Ok(Some("absolute decrease below threshold"))
    } else if decrease / error < options.min_rel_error_decrease_threshold {
        Ok(Some("relative decrease below threshold"))
    } else {
        Ok(None)
    }
}

fn to_optimizer_options(opts: &BackendSolveOptions) -> OptimizerOptions {
    let defaults = OptimizerOptions::default();
    OptimizerOptions {
        max_iteration: opts.max_iters,
        verbosity_level: opts.verbosity,
        linear_solver_type: match opts.linear_solver {
            Some(LinearSolverKind::SparseQR) => LinearSolverType::SparseQR,
            Some(LinearSolverKind::SparseCholesky) => LinearSolverType::SparseCholesky,
            None => defaults.linear_solver_type,
        },
        min_abs_error_decrease_threshold: opts
            .min_abs_decrease
            .unwrap_or(defaults.min_abs_error_decrease_threshold),
        min_rel_error_decrease_threshold: opts
            .min_rel_decrease
            .unwrap_or(defaults.min_rel_error_decrease_threshold),
        min_error_threshold: opts.min_error.unwrap_or(defaults.min_error_threshold),
        ..defaults
    }
}

fn compile_loss(loss: RobustLoss) -> Result<Option<Box<dyn Loss + Send>>> {
    let scale = match loss {
        RobustLoss::None => return Ok(None),
        RobustLoss::Huber { scale }
        | RobustLoss::Cauchy { scale }
        | RobustLoss::Arctan { scale } => scale,
    };
    ensure!(
        scale.is_finite() && scale > 0.0,
        "robust loss {:?} needs a positive scale",
        loss
    );
    let compiled: Box<dyn Loss + Send> = match loss {
        RobustLoss::Huber { .. } => Box::new(HuberLoss::new(scale)),
        RobustLoss::Cauchy { .. } => Box::new(CauchyLoss::new(scale)),
        RobustLoss::Arctan { .. } | RobustLoss::None => Box::new(ArctanLoss::new(scale)),
    };
    Ok(Some(compiled))
}

/// Adapter exposing a [`FactorKind`] as a tiny-solver factor.
#[derive(Debug, Clone)]
struct TinyReprojFactor {
    kind: FactorKind,
}

impl<T: nalgebra::RealField> Factor<T> for TinyReprojFactor {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        debug_assert_eq!(params.len(), self.kind.param_dims().len());
        let r = self.kind.residual_generic(params);
        DVector::from_column_slice(r.as_slice())
    }
}
