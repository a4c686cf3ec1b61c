use super::{run_bulk, JobStats, SyncJob};
use crate::constants::jobs;
use crate::engine::SyncEngine;
use crate::error::SyncResult;
use crate::models::TotalsRow;
use async_trait::async_trait;

/// Per-epoch totals; a repeated epoch keeps the values of its last row
#[derive(Debug, Clone, Copy, Default)]
pub struct TotalsJob;

#[async_trait]
impl SyncJob for TotalsJob {
    fn name(&self) -> &'static str {
        jobs::TOTALS
    }

    async fn execute(&self, engine: &SyncEngine) -> SyncResult<JobStats> {
        run_bulk(engine, self.name(), TotalsRow::fetch_request(engine.schema())).await
    }
}
