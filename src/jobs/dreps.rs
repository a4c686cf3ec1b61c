use super::{run_bulk, JobStats, SyncJob};
use crate::constants::jobs;
use crate::engine::SyncEngine;
use crate::error::SyncResult;
use crate::models::DrepRecord;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, Default)]
pub struct DrepsJob;

#[async_trait]
impl SyncJob for DrepsJob {
    fn name(&self) -> &'static str {
        jobs::DREPS
    }

    async fn execute(&self, engine: &SyncEngine) -> SyncResult<JobStats> {
        run_bulk(engine, self.name(), DrepRecord::fetch_request(engine.schema())).await
    }
}
