use super::{run_bulk, JobStats, SyncJob};
use crate::constants::jobs;
use crate::engine::SyncEngine;
use crate::error::SyncResult;
use crate::models::TreasuryWithdrawal;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, Default)]
pub struct TreasuryWithdrawalsJob;

#[async_trait]
impl SyncJob for TreasuryWithdrawalsJob {
    fn name(&self) -> &'static str {
        jobs::TREASURY_WITHDRAWALS
    }

    async fn execute(&self, engine: &SyncEngine) -> SyncResult<JobStats> {
        run_bulk(engine, self.name(), TreasuryWithdrawal::fetch_request(engine.schema())).await
    }
}
