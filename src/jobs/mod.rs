//! # Sync Jobs
//!
//! One job per replicated dataset. A job fetches its snapshot through the
//! [`SyncEngine`], either in one bulk call or by fanning out over an id list, and
//! hands the records to the refresh pipeline. An empty snapshot leaves the table
//! untouched.
//!
//! Jobs are stateless; the [`JobRunner`] around each one owns the state machine
//! and the overlap guard, and the [`JobRegistry`] holds one runner per job.

pub mod committee;
pub mod dreps;
pub mod proposals;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod totals;
pub mod treasury;

pub use committee::{CommitteeInfoJob, CommitteeVotesJob};
pub use dreps::DrepsJob;
pub use proposals::{ProposalVotesJob, ProposalsJob, VotingSummariesJob};
pub use registry::JobRegistry;
pub use runner::{JobRunner, JobState, TriggerOutcome};
pub use scheduler::JobScheduler;
pub use totals::TotalsJob;
pub use treasury::TreasuryWithdrawalsJob;

use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::source::FetchRequest;
use crate::sync::{FanOutReport, RefreshReport, UpsertRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Display;
use std::hash::Hash;
use tracing::{info, warn};
use uuid::Uuid;

#[async_trait]
pub trait SyncJob: Send + Sync {
    /// Stable job name, also the key under `jobs.<name>` in configuration
    fn name(&self) -> &'static str;

    /// Fetch the dataset and refresh its table
    async fn execute(&self, engine: &SyncEngine) -> SyncResult<JobStats>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// The table was replaced with the fetched snapshot
    Refreshed,
    /// Nothing was fetched; the table was left as it was
    NoData,
}

/// What one successful execution did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStats {
    pub outcome: JobOutcome,
    pub records_fetched: usize,
    pub records_written: usize,
    /// Ids whose fan-out fetch failed and contributed no rows
    pub failed_ids: usize,
    pub refresh: Option<RefreshReport>,
}

impl JobStats {
    pub fn no_data(failed_ids: usize) -> Self {
        Self {
            outcome: JobOutcome::NoData,
            records_fetched: 0,
            records_written: 0,
            failed_ids,
            refresh: None,
        }
    }

    pub fn refreshed(report: RefreshReport, failed_ids: usize) -> Self {
        Self {
            outcome: JobOutcome::Refreshed,
            records_fetched: report.fetched,
            records_written: report.written,
            failed_ids,
            refresh: Some(report),
        }
    }
}

/// One execution of a job, kept as the runner's last-run snapshot
#[derive(Debug, Clone, Serialize)]
pub struct JobRun {
    pub run_id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: JobState,
    pub records_fetched: usize,
    pub records_written: usize,
    pub outcome: Option<JobOutcome>,
    pub error: Option<String>,
}

impl JobRun {
    pub fn start(job_name: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            job_name: job_name.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            state: JobState::Running,
            records_fetched: 0,
            records_written: 0,
            outcome: None,
            error: None,
        }
    }

    pub fn succeed(&mut self, stats: &JobStats) {
        self.finished_at = Some(Utc::now());
        self.state = JobState::Succeeded;
        self.records_fetched = stats.records_fetched;
        self.records_written = stats.records_written;
        self.outcome = Some(stats.outcome);
    }

    pub fn fail(&mut self, error: &str) {
        self.finished_at = Some(Utc::now());
        self.state = JobState::Failed;
        self.error = Some(error.to_string());
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds().max(0) as u64)
    }
}

/// Refresh `records` into their table, or finish as no-data when there are none
pub(crate) async fn refresh_snapshot<R: UpsertRecord>(
    engine: &SyncEngine,
    job: &str,
    records: Vec<R>,
    failed_ids: usize,
) -> SyncResult<JobStats> {
    if records.is_empty() {
        info!(job = job, failed_ids = failed_ids, "📭 No records fetched, leaving table untouched");
        return Ok(JobStats::no_data(failed_ids));
    }

    let report = engine.refresh(records).await?;
    Ok(JobStats::refreshed(report, failed_ids))
}

/// Bulk flow: one failover fetch, then refresh
pub(crate) async fn run_bulk<R: UpsertRecord>(
    engine: &SyncEngine,
    job: &str,
    request: FetchRequest<R>,
) -> SyncResult<JobStats> {
    let records = engine.fetch(&request).await?;
    info!(job = job, records = records.len(), "📦 Snapshot fetched");
    refresh_snapshot(engine, job, records, 0).await
}

/// Fan-out flow over `ids`, then refresh whatever the ids returned.
///
/// Nothing is refreshed when the fan-out was abandoned for shutdown or when
/// every id failed.
pub(crate) async fn run_fan_out<K, R, F>(
    engine: &SyncEngine,
    job: &str,
    ids: Vec<K>,
    batch_size: usize,
    make_request: F,
) -> SyncResult<JobStats>
where
    K: Clone + Eq + Hash + Display,
    R: UpsertRecord,
    F: Fn(&K) -> FetchRequest<R>,
{
    if ids.is_empty() {
        info!(job = job, "📭 No ids to fan out over, leaving table untouched");
        return Ok(JobStats::no_data(0));
    }

    let report: FanOutReport<K, R> = engine.fan_out(job, ids, batch_size, make_request).await?;
    let failed = report.failed_ids.len();
    if report.all_failed() {
        return Err(SyncError::FanOutFailed {
            job: job.to_string(),
            ids: failed,
        });
    }
    if failed > 0 {
        warn!(
            job = job,
            failed_ids = failed,
            "⚠️ Some ids returned no data because every source failed for them"
        );
    }

    refresh_snapshot(engine, job, report.into_records(), failed).await
}
