//! Shape of the least-squares problem built from an observation log.
//!
//! Covers:
//! 1. One residual per log entry, with shared buffers mapped to one IR block
//! 2. Per-entity fix flags overriding the job-wide policy
//! 3. A held target pose under every variant that keeps it as a block
//! 4. Cameras whose distortion is dropped by a pinhole variant

use std::collections::BTreeMap;

use extcal_core::{
    BrownConrady5, Camera, CameraIntrinsics, PointObservation, Pose6, Roi, Scene, Target,
    TriggerConfig,
};
use extcal_optim::ir::{ParamBlock, ParamId, RobustLoss};
use extcal_pipeline::{
    run_scenes, AssembledProblem, BundleAssembler, CancelToken, EntityRegistry, FixPolicy,
    ObservationLog, ObserverMap, ReplayObserver, ResidualVariant, ScenePipelineOptions,
};

fn intrinsics() -> CameraIntrinsics {
    CameraIntrinsics::pinhole(500.0, 500.0, 320.0, 240.0)
}

fn board() -> Target {
    Target::new_static(
        "board",
        Pose6::new([0.0, 0.0, 0.0], [-0.05, -0.05, 1.0]),
        Target::grid_points(2, 2, 0.1),
    )
    .with_grid(2, 2)
}

fn observe(camera: &Camera, target: &Target) -> Vec<PointObservation> {
    let extr = camera.initial_pose(1);
    let pose = target.initial_pose(1);
    target
        .points
        .iter()
        .enumerate()
        .map(|(id, p)| {
            let uv = camera
                .intrinsics
                .project(&extr.transform_point(&pose.transform_point(p)))
                .expect("point in front of camera");
            PointObservation::new(&target.name, id, uv)
        })
        .collect()
}

/// Registry and log after one scene in which every camera sees `target`.
fn collect(cameras: &[Camera], target: &Target) -> (EntityRegistry, ObservationLog) {
    let mut registry = EntityRegistry::new();
    let mut observers = ObserverMap::new();
    let mut scene = Scene::new(1, TriggerConfig::default());
    for cam in cameras {
        registry.register_static_camera(cam).unwrap();
        observers.insert(
            cam.name.clone(),
            Box::new(ReplayObserver::new(&cam.name).with_scene(1, observe(cam, target))),
        );
        scene = scene.with_command(&cam.name, &target.name, Roi::new(0.0, 640.0, 0.0, 480.0));
    }
    registry.register_static_target(target).unwrap();

    let mut log = ObservationLog::new();
    run_scenes(
        &[scene],
        &mut registry,
        &mut log,
        &mut observers,
        &ScenePipelineOptions::default(),
        &CancelToken::new(),
    )
    .unwrap();
    (registry, log)
}

fn block<'a>(problem: &'a AssembledProblem, name: &str) -> &'a ParamBlock {
    problem
        .ir
        .params
        .iter()
        .find(|b| b.name == name)
        .unwrap_or_else(|| panic!("no block {name}"))
}

fn block_names(problem: &AssembledProblem) -> Vec<&str> {
    let mut names: Vec<&str> = problem.ir.params.iter().map(|b| b.name.as_str()).collect();
    names.sort_unstable();
    names
}

#[test]
fn per_camera_override_mixes_variants_in_one_problem() {
    let left = Camera::new_static("left", intrinsics(), Pose6::identity());
    let right = Camera::new_static(
        "right",
        intrinsics(),
        Pose6::new([0.0, 0.05, 0.0], [-0.1, 0.0, 0.0]),
    )
    .with_fixed_intrinsics(false);
    let (registry, log) = collect(&[left, right], &board());
    assert_eq!(log.len(), 8);

    let problem = BundleAssembler::default().assemble(&registry, &log).unwrap();

    assert_eq!(problem.ir.residuals.len(), log.len());
    assert_eq!(
        problem.variants,
        BTreeMap::from([
            (ResidualVariant::PointFixed, 4),
            (ResidualVariant::IntrinsicsPointFixed, 4),
        ])
    );
    // Points and left intrinsics are baked into the factors; the board pose
    // is shared by all eight residuals.
    assert_eq!(
        block_names(&problem),
        vec![
            "camera/left/extrinsics",
            "camera/right/extrinsics",
            "camera/right/intrinsics",
            "target/board/pose",
        ]
    );
    let pose = block(&problem, "target/board/pose").id;
    let sharing = problem
        .ir
        .residuals
        .iter()
        .filter(|r| r.params.contains(&pose))
        .count();
    assert_eq!(sharing, 8);
    assert_eq!(problem.ir.num_free_params(), 6 + 6 + 9 + 6);

    for (idx, param) in problem.ir.params.iter().enumerate() {
        let (handle, fixed) = problem.binding(ParamId(idx)).unwrap();
        assert!(!fixed, "{} should be free", param.name);
        assert_eq!(registry.buffer(handle).unwrap().label(), param.name);
    }
    assert!(problem.binding(ParamId(problem.ir.params.len())).is_none());
    assert!(problem.pinhole_with_distortion.is_empty());
}

#[test]
fn target_override_beats_job_policy() {
    let cam = Camera::new_static("cam", intrinsics(), Pose6::identity());
    let target = board().with_fixed_points(false).with_fixed_pose(true);
    let (registry, log) = collect(&[cam], &target);

    let problem = BundleAssembler::default().assemble(&registry, &log).unwrap();

    assert_eq!(
        problem.variants,
        BTreeMap::from([(ResidualVariant::IntrinsicsFixed, 4)])
    );
    // extrinsics, held pose and four free points
    assert_eq!(problem.ir.params.len(), 6);
    assert_eq!(problem.ir.num_free_params(), 6 + 4 * 3);
    assert!(block(&problem, "target/board/pose").fixed.is_all_fixed(6));
}

#[test]
fn held_target_pose_stays_a_fixed_block() {
    let cam = Camera::new_static("cam", intrinsics(), Pose6::identity());
    let (registry, log) = collect(&[cam], &board());

    let cases = [
        (false, false, ResidualVariant::Full, 7, 9 + 6 + 4 * 3),
        (false, true, ResidualVariant::PointFixed, 3, 9 + 6),
        (true, false, ResidualVariant::IntrinsicsFixed, 6, 6 + 4 * 3),
    ];
    for (intrinsics, target_points, variant, blocks, free) in cases {
        let fix = FixPolicy {
            intrinsics,
            target_points,
            target_pose: true,
        };
        let problem = BundleAssembler::new(fix, RobustLoss::None)
            .assemble(&registry, &log)
            .unwrap();

        assert_eq!(problem.ir.residuals.len(), 4, "{variant:?}");
        assert_eq!(problem.variants, BTreeMap::from([(variant, 4)]));
        assert_eq!(problem.ir.params.len(), blocks, "{variant:?}");
        assert_eq!(problem.ir.num_free_params(), free, "{variant:?}");

        let pose = block(&problem, "target/board/pose");
        assert!(pose.fixed.is_all_fixed(6), "{variant:?}");
        let (_, fixed) = problem.binding(pose.id).unwrap();
        assert!(fixed, "{variant:?}");
        let extr = block(&problem, "camera/cam/extrinsics");
        assert_eq!(problem.binding(extr.id).map(|(_, fixed)| fixed), Some(false));
    }
}

#[test]
fn pinhole_variants_flag_cameras_with_distortion() {
    let distorted = intrinsics().with_distortion(BrownConrady5::new(-0.1, 0.01, 0.0, 0.0, 0.0));
    let lens = Camera::new_static("lens", distorted, Pose6::identity());
    let plain = Camera::new_static(
        "plain",
        intrinsics(),
        Pose6::new([0.0, 0.05, 0.0], [-0.1, 0.0, 0.0]),
    );
    let (registry, log) = collect(&[lens, plain], &board());

    let pinhole = BundleAssembler::default().assemble(&registry, &log).unwrap();
    assert!(ResidualVariant::IntrinsicsPointFixed.is_pinhole());
    assert_eq!(pinhole.pinhole_with_distortion.len(), 1);
    assert!(pinhole.pinhole_with_distortion.contains("lens"));

    let fix = FixPolicy {
        intrinsics: false,
        ..FixPolicy::default()
    };
    let distorted_model = BundleAssembler::new(fix, RobustLoss::None)
        .assemble(&registry, &log)
        .unwrap();
    assert!(!ResidualVariant::PointFixed.is_pinhole());
    assert!(distorted_model.pinhole_with_distortion.is_empty());
}
