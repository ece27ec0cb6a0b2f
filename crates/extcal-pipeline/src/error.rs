//! Error types for loading, observation collection and optimization.

use std::fmt;
use std::time::Duration;

use extcal_core::{MotionKind, SceneId};
use extcal_optim::SolveSummary;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{JobPhase, JobState};
use crate::registry::BlockKind;

/// Which configuration document an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Cameras,
    Targets,
    Job,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Cameras => write!(f, "camera"),
            DocumentKind::Targets => write!(f, "target"),
            DocumentKind::Job => write!(f, "job"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Camera,
    Target,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Camera => write!(f, "camera"),
            EntityKind::Target => write!(f, "target"),
        }
    }
}

/// Failure to read, parse or validate a configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {kind} definitions from {origin}: {source}")]
    Io {
        kind: DocumentKind,
        origin: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed {kind} definitions in {origin}: {message}")]
    Parse {
        kind: DocumentKind,
        origin: String,
        message: String,
    },
    #[error("invalid {kind} definitions in {origin}: {entity}: {reason}")]
    Invalid {
        kind: DocumentKind,
        origin: String,
        entity: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn kind(&self) -> DocumentKind {
        match self {
            ConfigError::Io { kind, .. }
            | ConfigError::Parse { kind, .. }
            | ConfigError::Invalid { kind, .. } => *kind,
        }
    }
}

/// Lookup or registration failure in the entity registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("camera `{0}` is not registered")]
    CameraNotFound(String),
    #[error("target `{0}` is not registered")]
    TargetNotFound(String),
    #[error("target `{target}` has no point {point_id} (it defines {available})")]
    PointNotFound {
        target: String,
        point_id: usize,
        available: usize,
    },
    #[error("{kind} `{name}` is {registered}, cannot use it as {requested}")]
    MotionMismatch {
        kind: EntityKind,
        name: String,
        registered: MotionKind,
        requested: MotionKind,
    },
    #[error("{kind} `{name}` has no pose block for scene {scene}")]
    SceneBlockNotFound {
        kind: EntityKind,
        name: String,
        scene: SceneId,
    },
    #[error("parameter handle {0} is not allocated")]
    UnknownHandle(usize),
    #[error("parameter handle {index} does not refer to a {expected:?} block")]
    DanglingHandle { index: usize, expected: BlockKind },
    #[error("parameter block {label} expects {expected} values, got {got}")]
    DimensionMismatch {
        label: String,
        expected: usize,
        got: usize,
    },
}

/// Failure while processing one scene.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("scene {scene}: unresolved reference: {source}")]
    Resolution {
        scene: SceneId,
        #[source]
        source: RegistryError,
    },
    #[error("scene {scene}: no capture observer attached for camera `{camera}`")]
    MissingObserver { scene: SceneId, camera: String },
    #[error("scene {scene}: camera `{camera}` did not complete capture within {timeout:?}")]
    ObservationTimeout {
        scene: SceneId,
        camera: String,
        timeout: Duration,
    },
    #[error("scene {scene}: wait for camera `{camera}` was cancelled")]
    Cancelled { scene: SceneId, camera: String },
}

impl SceneError {
    pub fn scene(&self) -> SceneId {
        match self {
            SceneError::Resolution { scene, .. }
            | SceneError::MissingObserver { scene, .. }
            | SceneError::ObservationTimeout { scene, .. }
            | SceneError::Cancelled { scene, .. } => *scene,
        }
    }

    /// Errors the job-level resolution policy may skip.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            SceneError::Resolution { .. } | SceneError::MissingObserver { .. }
        )
    }
}

/// Failure to build or solve the bundle.
#[derive(Debug, Error)]
pub enum OptimizationError {
    #[error("observation log is empty; nothing to optimize")]
    NoObservations,
    #[error("cannot assemble problem: {0}")]
    Assembly(#[from] RegistryError),
    #[error("assembled problem is invalid: {0:#}")]
    InvalidProblem(anyhow::Error),
    #[error("optimizer backend `{backend}` failed: {error:#}")]
    Backend {
        backend: &'static str,
        error: anyhow::Error,
    },
    #[error(
        "optimizer terminated with {:?} (cost {} -> {}): {}",
        .summary.termination,
        .summary.initial_cost,
        .summary.final_cost,
        .summary.message
    )]
    NotConverged { summary: SolveSummary },
}

impl OptimizationError {
    pub fn summary(&self) -> Option<&SolveSummary> {
        match self {
            OptimizationError::NotConverged { summary } => Some(summary),
            _ => None,
        }
    }
}

/// Failure of a job operation.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot {operation} while job is {state}")]
    InvalidState {
        operation: &'static str,
        state: JobState,
    },
    #[error("observation phase failed: {0}")]
    Observations(#[source] SceneError),
    #[error("optimization phase failed: {0}")]
    Optimization(#[source] OptimizationError),
}

impl JobError {
    /// Phase of `run` that failed, if any.
    pub fn phase(&self) -> Option<JobPhase> {
        match self {
            JobError::Observations(_) => Some(JobPhase::Observations),
            JobError::Optimization(_) => Some(JobPhase::Optimization),
            JobError::Config(_) | JobError::InvalidState { .. } => None,
        }
    }
}
