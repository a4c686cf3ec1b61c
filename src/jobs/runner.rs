//! # Job Runner
//!
//! Wraps one [`SyncJob`] with its lifecycle:
//!
//! ```text
//! Idle -> Running -> Succeeded -> Idle
//!                 -> Failed    -> Idle
//! ```
//!
//! At most one run of a job is in flight. A trigger that arrives while a run is
//! in progress is dropped (not queued) and reported as [`TriggerOutcome::Skipped`].
//! Failures are logged with the job name and returned to the caller; the runner
//! never retries a job.

use super::{JobRun, JobStats, SyncJob};
use crate::engine::SyncEngine;
use crate::error::SyncResult;
use crate::logging::{log_error, log_job_operation};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for the next trigger
    Idle,
    /// A run is in progress
    Running,
    /// The last run completed
    Succeeded,
    /// The last run returned an error
    Failed,
}

impl JobState {
    /// Check if this state ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
                | (Self::Succeeded, Self::Idle)
                | (Self::Failed, Self::Idle)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Result of asking a runner to start its job
#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    /// The job ran to completion
    Completed { run: JobRun, stats: JobStats },
    /// Another run of the same job was in progress; nothing was started
    Skipped { job: String },
}

impl TriggerOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// Clears the in-flight flag when dropped, including on cancellation
struct RunGuard<'a> {
    running: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(running: &'a AtomicBool) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { running })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

pub struct JobRunner {
    job: Arc<dyn SyncJob>,
    running: AtomicBool,
    state: Mutex<JobState>,
    last_run: Mutex<Option<JobRun>>,
    probe_sources: bool,
}

impl fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRunner")
            .field("job", &self.job.name())
            .field("state", &self.state())
            .field("probe_sources", &self.probe_sources)
            .finish()
    }
}

impl JobRunner {
    pub fn new(job: Arc<dyn SyncJob>) -> Self {
        Self {
            job,
            running: AtomicBool::new(false),
            state: Mutex::new(JobState::Idle),
            last_run: Mutex::new(None),
            probe_sources: true,
        }
    }

    /// Disable the reachability probe logged before each run
    pub fn without_probe(mut self) -> Self {
        self.probe_sources = false;
        self
    }

    pub fn name(&self) -> &'static str {
        self.job.name()
    }

    pub fn state(&self) -> JobState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Snapshot of the most recent finished run
    pub fn last_run(&self) -> Option<JobRun> {
        self.last_run.lock().clone()
    }

    fn transition(&self, next: JobState) {
        let mut state = self.state.lock();
        let current = *state;
        if !current.can_transition_to(next) {
            // The guard makes this unreachable; log instead of failing the run
            error!(job = self.name(), from = %current, to = %next, "❌ Invalid job state transition");
        }
        debug!(job = self.name(), from = %current, to = %next, "Job state transition");
        *state = next;
    }

    /// Run the job now unless a run is already in flight
    pub async fn trigger(&self, engine: &SyncEngine) -> SyncResult<TriggerOutcome> {
        let name = self.name();
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            info!(job = name, "⏭️ Job already running, skipping trigger");
            return Ok(TriggerOutcome::Skipped {
                job: name.to_string(),
            });
        };

        self.transition(JobState::Running);
        let mut run = JobRun::start(name);
        log_job_operation(name, "start", "running", None, None, Some(&run.run_id.to_string()));

        if self.probe_sources {
            let probes = engine.probe_sources().await;
            let reachable = probes.iter().filter(|p| p.reachable).count();
            info!(
                job = name,
                reachable = reachable,
                configured = probes.len(),
                "🔎 Source reachability checked"
            );
        }

        let result = self.job.execute(engine).await;

        let outcome = match result {
            Ok(stats) => {
                run.succeed(&stats);
                self.transition(JobState::Succeeded);
                log_job_operation(
                    name,
                    "finish",
                    "succeeded",
                    Some(stats.records_written),
                    run.duration_ms(),
                    stats.refresh.as_ref().map(|r| r.table.as_str()),
                );
                Ok(TriggerOutcome::Completed {
                    run: run.clone(),
                    stats,
                })
            }
            Err(err) => {
                run.fail(&err.to_string());
                self.transition(JobState::Failed);
                log_error("job", name, &err.to_string(), Some(err.kind()));
                Err(err)
            }
        };

        *self.last_run.lock() = Some(run);
        self.transition(JobState::Idle);
        outcome
    }
}
