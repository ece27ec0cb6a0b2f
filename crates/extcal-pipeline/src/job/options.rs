use std::time::Duration;

use extcal_optim::backend::BackendSolveOptions;
use extcal_optim::ir::RobustLoss;
use serde::{Deserialize, Serialize};

use crate::assembler::{BundleAssembler, FixPolicy};
use crate::capture::WaitPolicy;
use crate::scene::{ResolutionPolicy, ScenePipelineOptions};

/// Job-level tuning, read from the `options` section of the job document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    /// Handling of scenes that reference unknown entities or points.
    pub resolution: ResolutionPolicy,
    /// Upper bound on the wait for each camera's observations.
    pub observation_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub fix: FixPolicy,
    pub robust_loss: RobustLoss,
    pub solver: BackendSolveOptions,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            resolution: ResolutionPolicy::Abort,
            observation_timeout_ms: 5000,
            poll_interval_ms: 5,
            fix: FixPolicy::default(),
            robust_loss: RobustLoss::None,
            solver: BackendSolveOptions::default(),
        }
    }
}

impl JobOptions {
    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            timeout: Duration::from_millis(self.observation_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
        }
    }

    pub fn pipeline_options(&self) -> ScenePipelineOptions {
        ScenePipelineOptions {
            wait: self.wait_policy(),
            resolution: self.resolution,
        }
    }

    pub fn assembler(&self) -> BundleAssembler {
        BundleAssembler::new(self.fix, self.robust_loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = "observation_timeout_ms: 250\nresolution: skip_scene\nrobust_loss:\n  kind: huber\n  scale: 2.0\n";
        let opts: JobOptions = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(opts.resolution, ResolutionPolicy::SkipScene);
        assert_eq!(opts.wait_policy().timeout, Duration::from_millis(250));
        assert_eq!(opts.poll_interval_ms, 5);
        assert_eq!(opts.robust_loss, RobustLoss::Huber { scale: 2.0 });
        assert_eq!(opts.fix, FixPolicy::default());
        assert_eq!(opts.solver.max_iters, 100);
    }

    #[test]
    fn zero_poll_interval_is_clamped() {
        let opts = JobOptions {
            poll_interval_ms: 0,
            ..JobOptions::default()
        };
        assert_eq!(opts.wait_policy().poll_interval, Duration::from_millis(1));
    }
}
