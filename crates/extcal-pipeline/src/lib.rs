//! Orchestration of multi-camera extrinsic calibration jobs.
//!
//! A [`CalibrationJob`] ties together:
//! - the [`EntityRegistry`], an arena of parameter buffers keyed by camera,
//!   target and scene,
//! - the [`ObservationLog`] of pixel measurements bound to those buffers,
//! - the scene pipeline that drives a [`CaptureObserver`] per camera,
//! - the [`BundleAssembler`] that turns the log into a least-squares problem
//!   and hands it to an [`extcal_optim::OptimBackend`].
//!
//! # Example
//!
//! ```no_run
//! use extcal_pipeline::{CalibrationJob, JobSources, ReplayObserver};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut job = CalibrationJob::new();
//! job.load(&JobSources::new("cameras.yaml", "targets.yaml", "job.yaml"))?;
//! job.attach_observer("left", ReplayObserver::new("left"));
//! let summary = job.run()?;
//! println!("converged: {}", summary.converged());
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod capture;
pub mod config;
pub mod error;
pub mod job;
pub mod observation_log;
pub mod registry;
pub mod scene;

pub use assembler::{AssembledProblem, BundleAssembler, FixPolicy, ResidualVariant};
pub use capture::{
    wait_for_completion, CancelToken, CaptureObserver, ObserverMap, RecordedObservations,
    RecordedScene, ReplayObserver, TriggerRequest, WaitOutcome, WaitPolicy,
};
pub use config::{DocumentFormat, JobDefinition, JobSources};
pub use error::{
    ConfigError, DocumentKind, EntityKind, JobError, OptimizationError, RegistryError, SceneError,
};
pub use job::{
    CalibrationJob, CalibrationReport, CameraReport, JobOptions, JobPhase, JobState, LogEntry,
    ReprojectionStats, ScenePose, TargetReport,
};
pub use observation_log::{ObservationBlocks, ObservationEntry, ObservationLog};
pub use registry::{
    BlockKind, CameraBlocks, EntityRegistry, ParamArena, ParamBuffer, ParamHandle, PointBlocks,
    TargetBlocks,
};
pub use scene::{
    run_scene, run_scenes, ResolutionPolicy, ScenePipelineOptions, SceneRunSummary, SkippedScene,
};
