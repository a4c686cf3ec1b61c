//! # Interval Scheduler
//!
//! Minimal scheduler honouring the runner contract: each job gets its own
//! ticker, and every tick triggers the job on a separate task so a run that
//! outlasts its interval makes the next tick skip instead of queueing.
//!
//! On shutdown no new runs start, and [`JobScheduler::run`] returns only after
//! the runs already in flight have finished.

use super::{JobRegistry, JobRunner, TriggerOutcome};
use crate::engine::SyncEngine;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

pub struct JobScheduler {
    engine: Arc<SyncEngine>,
    registry: Arc<JobRegistry>,
    intervals: HashMap<String, Duration>,
    default_interval: Duration,
    run_immediately: bool,
}

impl JobScheduler {
    pub fn new(engine: Arc<SyncEngine>, registry: Arc<JobRegistry>, default_interval: Duration) -> Self {
        Self {
            engine,
            registry,
            intervals: HashMap::new(),
            default_interval,
            run_immediately: true,
        }
    }

    pub fn with_interval(mut self, job: &str, interval: Duration) -> Self {
        self.intervals.insert(job.to_string(), interval);
        self
    }

    /// Wait one full interval before the first run instead of running at start
    pub fn delay_first_run(mut self) -> Self {
        self.run_immediately = false;
        self
    }

    pub fn interval_for(&self, job: &str) -> Duration {
        self.intervals.get(job).copied().unwrap_or(self.default_interval)
    }

    /// Run every registered job on its interval until `shutdown` flips to true.
    ///
    /// Returns after all job loops have stopped and their in-flight runs have
    /// completed, so the engine can be shut down right after.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let loops: Vec<JoinHandle<()>> = self
            .registry
            .runners()
            .iter()
            .map(|runner| {
                let interval = self.interval_for(runner.name());
                info!(job = runner.name(), interval_secs = interval.as_secs(), "⏰ Scheduling job");
                tokio::spawn(Self::job_loop(
                    Arc::clone(runner),
                    Arc::clone(&self.engine),
                    interval,
                    self.run_immediately,
                    shutdown.clone(),
                ))
            })
            .collect();

        for handle in loops {
            if let Err(e) = handle.await {
                error!(error = %e, "❌ Job loop terminated abnormally");
            }
        }
        info!("🛑 Scheduler stopped");
    }

    async fn job_loop(
        runner: Arc<JobRunner>,
        engine: Arc<SyncEngine>,
        interval: Duration,
        run_immediately: bool,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let start = if run_immediately {
            tokio::time::Instant::now()
        } else {
            tokio::time::Instant::now() + interval
        };
        let mut ticker = tokio::time::interval_at(start, interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut runs = JoinSet::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let runner = Arc::clone(&runner);
                    let engine = Arc::clone(&engine);
                    runs.spawn(async move {
                        match runner.trigger(&engine).await {
                            Ok(TriggerOutcome::Skipped { job }) => debug!(job = %job, "Tick skipped, previous run still active"),
                            Ok(TriggerOutcome::Completed { .. }) => {}
                            // Already logged by the runner
                            Err(_) => {}
                        }
                    });
                }
                Some(finished) = runs.join_next(), if !runs.is_empty() => {
                    if let Err(e) = finished {
                        error!(job = runner.name(), error = %e, "❌ Job run task panicked");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!(job = runner.name(), "Job loop stopping");
                        break;
                    }
                }
            }
        }

        if !runs.is_empty() {
            info!(job = runner.name(), in_flight = runs.len(), "⏳ Waiting for in-flight run to finish");
        }
        while let Some(finished) = runs.join_next().await {
            if let Err(e) = finished {
                error!(job = runner.name(), error = %e, "❌ Job run task panicked");
            }
        }
    }
}
