//! # Batch Refresh Pipeline
//!
//! Replaces the full contents of one destination table with a fetched snapshot:
//! delete everything, deduplicate, chunk, and write each chunk as one multi-row
//! upsert. The first failing statement aborts the refresh.

use crate::constants::defaults;
use crate::database::SqlValue;
use crate::destination::{DestinationError, DestinationStore, RefreshMode, RefreshSession};
use crate::query_builder::{max_rows_per_statement, UpsertBuilder};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What to do when two records of one snapshot share a dedupe key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DedupePolicy {
    /// The first occurrence wins
    KeepFirst,
    /// A later occurrence replaces the earlier one in place
    MergeOnConflict,
}

/// How records of one dataset become upsert statements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchUpsertSpec {
    pub table: &'static str,
    pub columns: &'static [&'static str],
    pub conflict_keys: &'static [&'static str],
    pub updateable: &'static [&'static str],
    pub dedupe: DedupePolicy,
}

impl BatchUpsertSpec {
    /// Rows per statement, bounded by the bind parameter limit
    pub fn effective_chunk_size(&self, requested: usize) -> usize {
        requested.min(max_rows_per_statement(self.columns.len())).max(1)
    }

    pub fn builder(&self) -> UpsertBuilder {
        UpsertBuilder::new(self.table)
            .columns(self.columns)
            .conflict_keys(self.conflict_keys)
            .update_columns(self.updateable)
    }

    fn key_positions(&self) -> Vec<usize> {
        self.conflict_keys
            .iter()
            .filter_map(|k| self.columns.iter().position(|c| c == k))
            .collect()
    }
}

/// Identity of a record within one refresh
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupeKey(Vec<String>);

impl DedupeKey {
    pub fn new(parts: Vec<String>) -> Self {
        Self(parts)
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

/// Hex SHA-256 of `payload`, used where the natural key cannot tell two rows apart
pub fn content_hash(payload: &str) -> String {
    let digest = Sha256::digest(payload.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// A record that can be written by the refresh pipeline
pub trait UpsertRecord: Send + Sync {
    fn spec() -> &'static BatchUpsertSpec;

    /// Values in `BatchUpsertSpec::columns` order
    fn to_row(&self) -> Vec<SqlValue>;

    /// Defaults to the conflict key columns of [`to_row`](Self::to_row), so a
    /// deduplicated chunk never hits the same destination row twice
    fn dedupe_key(&self) -> DedupeKey {
        let row = self.to_row();
        DedupeKey(
            Self::spec()
                .key_positions()
                .into_iter()
                .map(|i| row.get(i).map(SqlValue::key_fragment).unwrap_or_default())
                .collect(),
        )
    }
}

/// Collapse records sharing a dedupe key according to the dataset's policy.
///
/// Output keeps first-seen order.
pub fn dedupe<R: UpsertRecord>(records: Vec<R>) -> Vec<R> {
    let policy = R::spec().dedupe;
    let mut positions: HashMap<DedupeKey, usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<R> = Vec::with_capacity(records.len());

    for record in records {
        let key = record.dedupe_key();
        match positions.get(&key) {
            Some(&position) => {
                if policy == DedupePolicy::MergeOnConflict {
                    unique[position] = record;
                }
            }
            None => {
                positions.insert(key, unique.len());
                unique.push(record);
            }
        }
    }
    unique
}

/// Outcome of one table refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub table: String,
    pub mode: RefreshMode,
    pub fetched: usize,
    pub written: usize,
    pub duplicates_dropped: usize,
    pub deleted: u64,
    pub chunks: usize,
    pub rows_affected: u64,
}

#[derive(Clone)]
pub struct BatchRefresher {
    destination: Arc<dyn DestinationStore>,
    chunk_size: usize,
    mode: RefreshMode,
}

impl std::fmt::Debug for BatchRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRefresher")
            .field("destination", &self.destination.name())
            .field("chunk_size", &self.chunk_size)
            .field("mode", &self.mode)
            .finish()
    }
}

impl BatchRefresher {
    pub fn new(destination: Arc<dyn DestinationStore>, chunk_size: usize, mode: RefreshMode) -> Self {
        Self {
            destination,
            chunk_size: if chunk_size == 0 {
                defaults::UPSERT_CHUNK_SIZE
            } else {
                chunk_size
            },
            mode,
        }
    }

    pub fn mode(&self) -> RefreshMode {
        self.mode
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn destination(&self) -> &Arc<dyn DestinationStore> {
        &self.destination
    }

    /// Replace the contents of `R`'s table with `records`
    pub async fn refresh<R: UpsertRecord>(&self, records: Vec<R>) -> Result<RefreshReport, DestinationError> {
        let spec = R::spec();
        let started = Instant::now();
        let mut session = self.destination.begin_refresh(spec.table, self.mode).await?;

        match self.write(session.as_mut(), spec, records).await {
            Ok(report) => {
                session.commit().await?;
                info!(
                    table = spec.table,
                    mode = %self.mode,
                    fetched = report.fetched,
                    written = report.written,
                    duplicates_dropped = report.duplicates_dropped,
                    chunks = report.chunks,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "✅ Table refreshed"
                );
                Ok(report)
            }
            Err(err) => {
                if let Err(rollback_err) = session.rollback().await {
                    warn!(table = spec.table, error = %rollback_err, "⚠️ Rollback failed");
                }
                if self.mode == RefreshMode::DeleteThenInsert {
                    warn!(
                        table = spec.table,
                        error = %err,
                        "⚠️ Refresh failed after delete, table may be partially populated until the next run"
                    );
                }
                Err(err)
            }
        }
    }

    async fn write<R: UpsertRecord>(
        &self,
        session: &mut dyn RefreshSession,
        spec: &'static BatchUpsertSpec,
        records: Vec<R>,
    ) -> Result<RefreshReport, DestinationError> {
        let deleted = session.delete_all().await?;
        debug!(table = spec.table, deleted = deleted, "Cleared destination table");

        let fetched = records.len();
        let unique = dedupe(records);
        let duplicates_dropped = fetched - unique.len();
        if duplicates_dropped > 0 {
            debug!(
                table = spec.table,
                duplicates = duplicates_dropped,
                policy = ?spec.dedupe,
                "Collapsed duplicate records"
            );
        }

        let chunk_size = spec.effective_chunk_size(self.chunk_size);
        let mut chunks = 0;
        let mut rows_affected = 0;
        for (index, chunk) in unique.chunks(chunk_size).enumerate() {
            let statement = spec
                .builder()
                .rows(chunk.iter().map(UpsertRecord::to_row))
                .build()?;
            rows_affected += session.upsert(&statement).await.map_err(|e| {
                warn!(table = spec.table, chunk = index, rows = chunk.len(), error = %e, "❌ Chunk upsert failed");
                e
            })?;
            chunks += 1;
        }

        Ok(RefreshReport {
            table: spec.table.to_string(),
            mode: self.mode,
            fetched,
            written: unique.len(),
            duplicates_dropped,
            deleted,
            chunks,
            rows_affected,
        })
    }
}
