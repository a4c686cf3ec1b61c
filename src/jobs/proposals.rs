//! Governance actions, the votes cast on them and their per-epoch tallies.
//!
//! Votes and tallies are fetched per proposal; the id list comes from the
//! proposal list function on every run.

use super::{run_bulk, run_fan_out, JobStats, SyncJob};
use crate::constants::jobs;
use crate::engine::SyncEngine;
use crate::error::SyncResult;
use crate::models::{proposal_ids_request, Proposal, ProposalVote, VotingSummary};
use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct ProposalsJob;

#[async_trait]
impl SyncJob for ProposalsJob {
    fn name(&self) -> &'static str {
        jobs::PROPOSALS
    }

    async fn execute(&self, engine: &SyncEngine) -> SyncResult<JobStats> {
        run_bulk(engine, self.name(), Proposal::fetch_request(engine.schema())).await
    }
}

async fn proposal_ids(engine: &SyncEngine, job: &str) -> SyncResult<Vec<String>> {
    let ids = engine.fetch(&proposal_ids_request(engine.schema())).await?;
    info!(job = job, proposals = ids.len(), "🗳️ Proposal ids resolved");
    Ok(ids)
}

#[derive(Debug, Clone, Copy)]
pub struct ProposalVotesJob {
    batch_size: usize,
}

impl ProposalVotesJob {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }
}

impl Default for ProposalVotesJob {
    fn default() -> Self {
        Self::new(jobs::default_batch_size(jobs::PROPOSAL_VOTES))
    }
}

#[async_trait]
impl SyncJob for ProposalVotesJob {
    fn name(&self) -> &'static str {
        jobs::PROPOSAL_VOTES
    }

    async fn execute(&self, engine: &SyncEngine) -> SyncResult<JobStats> {
        let ids = proposal_ids(engine, self.name()).await?;
        let schema = engine.schema();
        run_fan_out(engine, self.name(), ids, self.batch_size, |proposal_id: &String| {
            ProposalVote::fetch_request(schema, proposal_id)
        })
        .await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VotingSummariesJob {
    batch_size: usize,
}

impl VotingSummariesJob {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }
}

impl Default for VotingSummariesJob {
    fn default() -> Self {
        Self::new(jobs::default_batch_size(jobs::VOTING_SUMMARIES))
    }
}

#[async_trait]
impl SyncJob for VotingSummariesJob {
    fn name(&self) -> &'static str {
        jobs::VOTING_SUMMARIES
    }

    async fn execute(&self, engine: &SyncEngine) -> SyncResult<JobStats> {
        let ids = proposal_ids(engine, self.name()).await?;
        let schema = engine.schema();
        run_fan_out(engine, self.name(), ids, self.batch_size, |proposal_id: &String| {
            VotingSummary::fetch_request(schema, proposal_id)
        })
        .await
    }
}
