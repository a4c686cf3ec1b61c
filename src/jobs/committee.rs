//! Committee composition and committee member votes.

use super::{run_bulk, run_fan_out, JobStats, SyncJob};
use crate::constants::jobs;
use crate::engine::SyncEngine;
use crate::error::SyncResult;
use crate::models::{member_hot_ids, CommitteeInfo, CommitteeVote};
use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct CommitteeInfoJob;

#[async_trait]
impl SyncJob for CommitteeInfoJob {
    fn name(&self) -> &'static str {
        jobs::COMMITTEE_INFO
    }

    async fn execute(&self, engine: &SyncEngine) -> SyncResult<JobStats> {
        run_bulk(engine, self.name(), CommitteeInfo::fetch_request(engine.schema())).await
    }
}

/// Votes per committee hot credential.
///
/// The member list is read from the committee info function on every run, so a
/// membership change is picked up without touching the committee info table.
#[derive(Debug, Clone, Copy)]
pub struct CommitteeVotesJob {
    batch_size: usize,
}

impl CommitteeVotesJob {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }
}

impl Default for CommitteeVotesJob {
    fn default() -> Self {
        Self::new(jobs::default_batch_size(jobs::COMMITTEE_VOTES))
    }
}

#[async_trait]
impl SyncJob for CommitteeVotesJob {
    fn name(&self) -> &'static str {
        jobs::COMMITTEE_VOTES
    }

    async fn execute(&self, engine: &SyncEngine) -> SyncResult<JobStats> {
        let schema = engine.schema();
        let committees = engine.fetch(&CommitteeInfo::fetch_request(schema)).await?;
        let hot_ids = member_hot_ids(&committees);
        info!(job = self.name(), members = hot_ids.len(), "👥 Committee members resolved");

        run_fan_out(engine, self.name(), hot_ids, self.batch_size, |cc_hot_id: &String| {
            CommitteeVote::fetch_request(schema, cc_hot_id)
        })
        .await
    }
}
