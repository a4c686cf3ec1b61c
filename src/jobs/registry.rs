//! One [`JobRunner`] per dataset job, built from configuration.

use super::{
    CommitteeInfoJob, CommitteeVotesJob, DrepsJob, JobRunner, ProposalVotesJob, ProposalsJob,
    SyncJob, TotalsJob, TreasuryWithdrawalsJob, TriggerOutcome, VotingSummariesJob,
};
use crate::config::GovsyncConfig;
use crate::constants::jobs;
use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Default)]
pub struct JobRegistry {
    runners: Vec<Arc<JobRunner>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every job with its default batch size
    pub fn standard() -> Self {
        Self::from_config(&GovsyncConfig::default())
    }

    /// Enabled jobs, with batch sizes from `jobs.<name>.batch_size`
    pub fn from_config(config: &GovsyncConfig) -> Self {
        let all: Vec<Arc<dyn SyncJob>> = vec![
            Arc::new(CommitteeInfoJob),
            Arc::new(CommitteeVotesJob::new(config.job_batch_size(jobs::COMMITTEE_VOTES))),
            Arc::new(TreasuryWithdrawalsJob),
            Arc::new(TotalsJob),
            Arc::new(ProposalsJob),
            Arc::new(ProposalVotesJob::new(config.job_batch_size(jobs::PROPOSAL_VOTES))),
            Arc::new(VotingSummariesJob::new(config.job_batch_size(jobs::VOTING_SUMMARIES))),
            Arc::new(DrepsJob),
        ];

        let mut registry = Self::new();
        for job in all {
            if config.job_enabled(job.name()) {
                registry.register(job);
            } else {
                info!(job = job.name(), "⏸️ Job disabled by configuration");
            }
        }
        registry
    }

    pub fn register(&mut self, job: Arc<dyn SyncJob>) {
        self.register_runner(JobRunner::new(job));
    }

    pub fn register_runner(&mut self, runner: JobRunner) {
        self.runners.retain(|existing| existing.name() != runner.name());
        self.runners.push(Arc::new(runner));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<JobRunner>> {
        self.runners.iter().find(|runner| runner.name() == name)
    }

    pub fn runners(&self) -> &[Arc<JobRunner>] {
        &self.runners
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.runners.iter().map(|runner| runner.name()).collect()
    }

    /// Trigger one job by name
    pub async fn trigger(&self, name: &str, engine: &SyncEngine) -> SyncResult<TriggerOutcome> {
        let runner = self
            .get(name)
            .ok_or_else(|| SyncError::UnknownJob(name.to_string()))?;
        runner.trigger(engine).await
    }

    /// Trigger every job in registration order; one failure does not stop the rest
    pub async fn trigger_all(&self, engine: &SyncEngine) -> Vec<(&'static str, SyncResult<TriggerOutcome>)> {
        let mut results = Vec::with_capacity(self.runners.len());
        for runner in &self.runners {
            results.push((runner.name(), runner.trigger(engine).await));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobConfig;

    #[test]
    fn test_standard_registry_has_every_job() {
        let registry = JobRegistry::standard();
        assert_eq!(registry.names(), jobs::ALL.to_vec());
    }

    #[test]
    fn test_disabled_jobs_are_not_registered() {
        let mut config = GovsyncConfig::default();
        config.jobs.insert(
            jobs::DREPS.to_string(),
            JobConfig {
                enabled: false,
                ..JobConfig::default()
            },
        );
        let registry = JobRegistry::from_config(&config);
        assert!(registry.get(jobs::DREPS).is_none());
        assert_eq!(registry.runners().len(), jobs::ALL.len() - 1);
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = JobRegistry::new();
        registry.register(Arc::new(TotalsJob));
        registry.register(Arc::new(TotalsJob));
        assert_eq!(registry.names(), vec![jobs::TOTALS]);
    }
}
