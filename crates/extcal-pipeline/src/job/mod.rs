//! Calibration job: load configuration, collect observations, solve.
//!
//! ```text
//! Unloaded --load--> Loaded --run--> ObservationsCollected --> Optimized
//!                      ^                      |
//!                      +--- pipeline failure -+
//! ```
//!
//! `load` may be called from any state and replaces everything atomically.
//! `run` always starts from a freshly seeded registry and an empty log.

mod history;
mod options;
mod report;

use std::fmt;

use extcal_optim::backend::{OptimBackend, SolveSummary, TinySolverBackend};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::capture::{CancelToken, CaptureObserver, ObserverMap};
use crate::config::{JobDefinition, JobSources};
use crate::error::{JobError, OptimizationError};
use crate::observation_log::ObservationLog;
use crate::registry::EntityRegistry;
use crate::scene::{run_scenes, SceneRunSummary};

pub use history::{current_timestamp, LogEntry};
pub use options::JobOptions;
pub use report::{CalibrationReport, CameraReport, ReprojectionStats, ScenePose, TargetReport};

/// Lifecycle state of a [`CalibrationJob`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Unloaded,
    Loaded,
    ObservationsCollected,
    Optimized,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Unloaded => "unloaded",
            JobState::Loaded => "loaded",
            JobState::ObservationsCollected => "observations_collected",
            JobState::Optimized => "optimized",
        };
        f.write_str(name)
    }
}

/// Phase of [`CalibrationJob::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Observations,
    Optimization,
}

/// Orchestrates one extrinsic calibration.
pub struct CalibrationJob {
    definition: Option<JobDefinition>,
    options: JobOptions,
    registry: EntityRegistry,
    log: ObservationLog,
    observers: ObserverMap,
    backend: Box<dyn OptimBackend>,
    cancel: CancelToken,
    state: JobState,
    scenes: SceneRunSummary,
    summary: Option<SolveSummary>,
    history: Vec<LogEntry>,
}

impl Default for CalibrationJob {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationJob {
    pub fn new() -> Self {
        Self::with_backend(TinySolverBackend)
    }

    pub fn with_backend(backend: impl OptimBackend + 'static) -> Self {
        Self {
            definition: None,
            options: JobOptions::default(),
            registry: EntityRegistry::new(),
            log: ObservationLog::new(),
            observers: ObserverMap::new(),
            backend: Box::new(backend),
            cancel: CancelToken::new(),
            state: JobState::Unloaded,
            scenes: SceneRunSummary::default(),
            summary: None,
            history: Vec::new(),
        }
    }

    /// Attach the capture observer serving `camera`, replacing any previous one.
    pub fn attach_observer(
        &mut self,
        camera: impl Into<String>,
        observer: impl CaptureObserver + 'static,
    ) {
        self.observers.insert(camera.into(), Box::new(observer));
    }

    pub fn detach_observer(&mut self, camera: &str) -> Option<Box<dyn CaptureObserver>> {
        self.observers.remove(camera)
    }

    /// Token that cancels an in-flight capture wait. A cancelled token stays
    /// cancelled until [`CancelToken::reset`].
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Read, validate and commit the three documents.
    ///
    /// On error the job is left exactly as it was.
    pub fn load(&mut self, sources: &JobSources) -> Result<(), JobError> {
        let staged = sources.read().and_then(|definition| {
            let registry = definition.build_registry()?;
            Ok((definition, registry))
        });
        match staged {
            Ok((definition, registry)) => {
                self.commit(definition, registry);
                Ok(())
            }
            Err(err) => {
                warn!("load failed: {}", err);
                self.history.push(LogEntry::failure("load", err.to_string()));
                Err(err.into())
            }
        }
    }

    /// Commit an already validated definition.
    pub fn load_definition(&mut self, definition: JobDefinition) -> Result<(), JobError> {
        match definition.build_registry() {
            Ok(registry) => {
                self.commit(definition, registry);
                Ok(())
            }
            Err(err) => {
                self.history.push(LogEntry::failure("load", err.to_string()));
                Err(err.into())
            }
        }
    }

    fn commit(&mut self, definition: JobDefinition, registry: EntityRegistry) {
        let notes = format!(
            "{} cameras, {} targets, {} scenes",
            definition.cameras.len(),
            definition.targets.len(),
            definition.scenes.len()
        );
        info!("job loaded: {}", notes);
        self.options = definition.options.clone();
        self.definition = Some(definition);
        self.registry = registry;
        self.log.clear();
        self.scenes = SceneRunSummary::default();
        self.summary = None;
        self.state = JobState::Loaded;
        self.history.push(LogEntry::success_with_notes("load", notes));
    }

    /// Collect observations for every scene, then solve the bundle.
    pub fn run(&mut self) -> Result<SolveSummary, JobError> {
        let Some(definition) = self.definition.as_ref() else {
            return Err(JobError::InvalidState {
                operation: "run",
                state: self.state,
            });
        };

        self.registry = definition.build_registry()?;
        self.log.clear();
        self.scenes = SceneRunSummary::default();
        self.summary = None;
        self.state = JobState::Loaded;

        let pipeline = self.options.pipeline_options();
        match run_scenes(
            &definition.scenes,
            &mut self.registry,
            &mut self.log,
            &mut self.observers,
            &pipeline,
            &self.cancel,
        ) {
            Ok(scenes) => {
                self.history.push(LogEntry::success_with_notes(
                    "observations",
                    format!(
                        "{} observations from {} scenes, {} skipped",
                        self.log.len(),
                        scenes.processed.len(),
                        scenes.skipped.len()
                    ),
                ));
                self.scenes = scenes;
                self.state = JobState::ObservationsCollected;
            }
            Err(err) => {
                warn!("observation phase failed: {}", err);
                self.log.clear();
                self.history
                    .push(LogEntry::failure("observations", err.to_string()));
                return Err(JobError::Observations(err));
            }
        }

        let assembler = self.options.assembler();
        match assembler.solve(
            &mut self.registry,
            &self.log,
            &*self.backend,
            &self.options.solver,
        ) {
            Ok(summary) => {
                self.history.push(LogEntry::success_with_notes(
                    "optimize",
                    format!(
                        "cost {:.6e} -> {:.6e}, rms {:.4} px",
                        summary.initial_cost,
                        summary.final_cost,
                        summary.rms_error()
                    ),
                ));
                self.summary = Some(summary.clone());
                self.state = JobState::Optimized;
                Ok(summary)
            }
            Err(err) => {
                warn!("optimization phase failed: {}", err);
                self.summary = err.summary().cloned();
                self.history.push(LogEntry::failure("optimize", err.to_string()));
                Err(JobError::Optimization(err))
            }
        }
    }

    /// Snapshot of the current estimates.
    pub fn report(&self) -> Result<CalibrationReport, OptimizationError> {
        let reference_frame = self
            .definition
            .as_ref()
            .map(|d| d.reference_frame.as_str())
            .unwrap_or_default();
        CalibrationReport::build(
            reference_frame,
            self.state,
            &self.registry,
            &self.log,
            &self.options.assembler(),
            &self.scenes,
            self.summary.as_ref(),
        )
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn definition(&self) -> Option<&JobDefinition> {
        self.definition.as_ref()
    }

    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    /// Options applied by the next `run`; reset by `load`.
    pub fn options_mut(&mut self) -> &mut JobOptions {
        &mut self.options
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn observation_log(&self) -> &ObservationLog {
        &self.log
    }

    pub fn scene_summary(&self) -> &SceneRunSummary {
        &self.scenes
    }

    /// Summary of the last solve, including a non-converged one.
    pub fn summary(&self) -> Option<&SolveSummary> {
        self.summary.as_ref()
    }

    pub fn history(&self) -> &[LogEntry] {
        &self.history
    }
}
