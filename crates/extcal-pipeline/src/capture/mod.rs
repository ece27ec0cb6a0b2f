//! Capture collaborators and the bounded wait used to drive them.
//!
//! The scene pipeline never blocks indefinitely on a device: completion is
//! polled until either the [`WaitPolicy`] timeout elapses or the shared
//! [`CancelToken`] is raised.

mod replay;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use extcal_core::{PointObservation, Roi, SceneId, Target, TriggerConfig};

pub use replay::{RecordedObservations, RecordedScene, ReplayObserver};

/// Trigger issued to every camera participating in a scene.
#[derive(Debug, Clone, Copy)]
pub struct TriggerRequest<'a> {
    pub scene: SceneId,
    pub trigger: &'a TriggerConfig,
}

/// Per-camera image acquisition and target detection.
///
/// One observer is attached per camera name. Within a scene the pipeline calls
/// `reset_observations`, `reset_targets`, `configure_target` for every command,
/// `trigger`, then polls `is_complete` before `collect_observations`.
pub trait CaptureObserver {
    fn reset_observations(&mut self);
    fn reset_targets(&mut self);
    /// Look for `target` inside `roi` on the next trigger.
    fn configure_target(&mut self, target: &Target, roi: &Roi);
    fn trigger(&mut self, request: &TriggerRequest<'_>);
    fn is_complete(&self) -> bool;
    fn collect_observations(&mut self) -> Vec<PointObservation>;
}

/// Observers keyed by camera name.
pub type ObserverMap = BTreeMap<String, Box<dyn CaptureObserver>>;

/// Timeout and polling interval for capture completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(5),
        }
    }
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Lower the flag so the token can be reused for another run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Complete,
    TimedOut,
    Cancelled,
}

/// Poll `observer` until it reports completion, the timeout elapses, or
/// `cancel` is raised. Completion is checked before the deadline so a
/// zero timeout still accepts an already complete observer.
pub fn wait_for_completion(
    observer: &dyn CaptureObserver,
    policy: &WaitPolicy,
    cancel: &CancelToken,
) -> WaitOutcome {
    let deadline = Instant::now() + policy.timeout;
    loop {
        if observer.is_complete() {
            return WaitOutcome::Complete;
        }
        if cancel.is_cancelled() {
            return WaitOutcome::Cancelled;
        }
        let now = Instant::now();
        if now >= deadline {
            return WaitOutcome::TimedOut;
        }
        thread::sleep(policy.poll_interval.min(deadline - now));
    }
}
