//! Integration tests for the tiny-solver backend on synthetic bundles.
//!
//! This test validates:
//! 1. Camera-only localization recovers a perturbed extrinsics block
//! 2. Fully fixed blocks come back untouched
//! 3. The summary reports a converged run with reduced cost
//! 4. Stopping on the iteration cap is reported as non-convergence

use extcal_core::{CameraIntrinsics, Pose6, Pt3, Target};
use extcal_optim::backend::{BackendSolveOptions, OptimBackend, Termination, TinySolverBackend};
use extcal_optim::ir::{FactorKind, FixedMask, ProblemIR, ResidualBlock, RobustLoss};
use extcal_optim::params::{pack_pose, unpack_pose};
use nalgebra::DVector;
use std::collections::HashMap;

fn project(k: &CameraIntrinsics, extr: &Pose6, pose: &Pose6, p: &Pt3) -> [f64; 2] {
    let uv = k
        .project(&extr.transform_point(&pose.transform_point(p)))
        .expect("point in front of camera");
    [uv.x, uv.y]
}

fn assert_pose_close(a: &Pose6, b: &Pose6, tol: f64) {
    for (x, y) in a.to_array().iter().zip(b.to_array()) {
        assert!((x - y).abs() < tol, "{a:?} vs {b:?}");
    }
}

/// Camera-only bundle over a 5x6 board with a perturbed extrinsics guess.
fn camera_only_bundle() -> (ProblemIR, HashMap<String, DVector<f64>>, Pose6) {
    let k = CameraIntrinsics::pinhole(800.0, 800.0, 640.0, 360.0);
    let extr_gt = Pose6::new([0.02, -0.05, 0.01], [0.05, -0.02, 1.0]);
    let target_pose = Pose6::new([0.0, 0.0, 0.1], [-0.1, -0.1, 0.0]);
    let points = Target::grid_points(5, 6, 0.04);

    let mut ir = ProblemIR::new();
    let extr = ir.add_param_block("camera/cam0/extrinsics", 6, FixedMask::all_free(), None);
    for p in &points {
        ir.add_residual_block(ResidualBlock {
            params: vec![extr],
            loss: RobustLoss::None,
            factor: FactorKind::ReprojCameraOnly {
                uv: project(&k, &extr_gt, &target_pose, p),
                k: k.pinhole_array(),
                point: [p.x, p.y, p.z],
                target_pose: target_pose.to_array(),
            },
            residual_dim: 2,
        });
    }

    let extr_init = Pose6::new([0.05, -0.02, 0.0], [0.0, 0.0, 0.9]);
    let initial = HashMap::from([("camera/cam0/extrinsics".to_string(), pack_pose(&extr_init))]);
    (ir, initial, extr_gt)
}

#[test]
fn camera_only_localization_converges() {
    let (ir, initial, extr_gt) = camera_only_bundle();

    let solution = TinySolverBackend
        .solve(&ir, &initial, &BackendSolveOptions::default())
        .unwrap();

    assert!(solution.summary.converged(), "{:?}", solution.summary);
    assert!(solution.summary.final_cost < solution.summary.initial_cost);
    assert!(solution.summary.final_cost < 1e-4);
    let solved = unpack_pose(solution.params["camera/cam0/extrinsics"].as_view()).unwrap();
    assert_pose_close(&solved, &extr_gt, 1e-3);
}

#[test]
fn iteration_cap_reports_no_convergence() {
    let (ir, initial, _) = camera_only_bundle();
    let opts = BackendSolveOptions {
        max_iters: 1,
        ..BackendSolveOptions::default()
    };

    let solution = TinySolverBackend.solve(&ir, &initial, &opts).unwrap();

    let summary = &solution.summary;
    assert_eq!(summary.termination, Termination::NoConvergence, "{summary:?}");
    assert!(!summary.converged());
    assert!(summary.final_cost < summary.initial_cost, "{summary:?}");
    assert!(summary.message.contains("still decreasing"), "{}", summary.message);
}

#[test]
fn fixed_target_pose_is_left_untouched() {
    let k = CameraIntrinsics::pinhole(800.0, 800.0, 640.0, 360.0);
    let extr_gt = Pose6::new([0.0, 0.03, 0.0], [0.0, 0.0, 1.2]);
    let target_pose = Pose6::new([0.05, 0.0, 0.0], [-0.1, -0.1, 0.0]);
    let points = Target::grid_points(4, 4, 0.05);

    let mut ir = ProblemIR::new();
    let extr = ir.add_param_block("extr", 6, FixedMask::all_free(), None);
    let pose = ir.add_param_block("pose", 6, FixedMask::all_fixed(6), None);
    for p in &points {
        ir.add_residual_block(ResidualBlock {
            params: vec![extr, pose],
            loss: RobustLoss::Huber { scale: 2.0 },
            factor: FactorKind::ReprojIntrinsicsPointFixed {
                uv: project(&k, &extr_gt, &target_pose, p),
                k: k.pinhole_array(),
                point: [p.x, p.y, p.z],
            },
            residual_dim: 2,
        });
    }

    let initial = HashMap::from([
        (
            "extr".to_string(),
            pack_pose(&Pose6::new([0.0, 0.0, 0.0], [0.02, 0.0, 1.1])),
        ),
        ("pose".to_string(), pack_pose(&target_pose)),
    ]);

    let solution = TinySolverBackend
        .solve(&ir, &initial, &BackendSolveOptions::default())
        .unwrap();

    assert!(solution.summary.converged(), "{:?}", solution.summary);
    let pose_out: &DVector<f64> = &solution.params["pose"];
    assert_eq!(pose_out, &initial["pose"]);
    let solved = unpack_pose(solution.params["extr"].as_view()).unwrap();
    assert_pose_close(&solved, &extr_gt, 1e-3);
}

#[test]
fn missing_initial_value_is_an_error() {
    let mut ir = ProblemIR::new();
    let extr = ir.add_param_block("extr", 6, FixedMask::all_free(), None);
    ir.add_residual_block(ResidualBlock {
        params: vec![extr],
        loss: RobustLoss::None,
        factor: FactorKind::ReprojCameraOnly {
            uv: [0.0, 0.0],
            k: [1.0, 1.0, 0.0, 0.0],
            point: [0.0, 0.0, 0.0],
            target_pose: [0.0; 6],
        },
        residual_dim: 2,
    });
    let err = TinySolverBackend
        .solve(&ir, &HashMap::new(), &BackendSolveOptions::default())
        .unwrap_err();
    assert!(
        err.to_string().contains("no initial value for parameter block `extr`"),
        "{err}"
    );
}
