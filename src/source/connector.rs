//! Transport seam between the query executor and a concrete source backend.
//!
//! The executor owns deadlines, throttling and retries; a connector only knows how
//! to run one statement against one source and hand back owned rows.

use super::{Source, SourceError, SourceRow, SourceStatement};
use async_trait::async_trait;

#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Run `statement` on `source` once and return every row
    async fn fetch_rows(
        &self,
        source: &Source,
        statement: &SourceStatement,
    ) -> Result<Vec<SourceRow>, SourceError>;

    /// Cheap liveness probe (`SELECT 1` or equivalent)
    async fn ping(&self, source: &Source) -> Result<(), SourceError>;

    /// Release any pooled resources held for sources
    async fn close(&self) {}
}
