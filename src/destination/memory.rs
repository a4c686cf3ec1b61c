//! In-memory destination store.
//!
//! Applies upserts with the same conflict semantics PostgreSQL does, including
//! rejecting a `DO UPDATE` statement that touches one key twice. Backs the
//! binary's `--dry-run` mode and the test suites.

use super::{DestinationError, DestinationStore, RefreshMode, RefreshSession};
use crate::database::{PgErrorCode, SqlValue};
use crate::query_builder::UpsertStatement;
use crate::source::SourceRow;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct TableData {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    /// Conflict-key fragment to row position
    index: HashMap<Vec<String>, usize>,
}

impl TableData {
    fn clear(&mut self) -> u64 {
        let removed = self.rows.len() as u64;
        self.rows.clear();
        self.index.clear();
        removed
    }

    fn apply(&mut self, statement: &UpsertStatement) -> Result<u64, DestinationError> {
        if self.columns.is_empty() {
            self.columns = statement.columns.clone();
        } else if self.columns != statement.columns {
            return Err(DestinationError::query(
                &statement.table,
                format!(
                    "column list {:?} does not match table columns {:?}",
                    statement.columns, self.columns
                ),
            ));
        }

        let key_positions: Vec<usize> = statement
            .conflict_keys
            .iter()
            .filter_map(|k| statement.column_index(k))
            .collect();
        let update_positions: Vec<usize> = statement
            .updateable
            .iter()
            .filter_map(|c| statement.column_index(c))
            .collect();
        let do_update = !update_positions.is_empty();

        let mut touched = HashSet::new();
        let mut affected = 0;
        for row in &statement.rows {
            let key: Vec<String> = key_positions.iter().map(|&i| row[i].key_fragment()).collect();
            if !touched.insert(key.clone()) && do_update {
                return Err(DestinationError::Query {
                    table: statement.table.clone(),
                    code: Some(PgErrorCode::CARDINALITY_VIOLATION.to_string()),
                    message: "ON CONFLICT DO UPDATE command cannot affect row a second time"
                        .to_string(),
                });
            }

            match self.index.get(&key) {
                Some(&position) if do_update => {
                    for &i in &update_positions {
                        self.rows[position][i] = row[i].clone();
                    }
                    affected += 1;
                }
                Some(_) => {}
                None => {
                    self.index.insert(key, self.rows.len());
                    self.rows.push(row.clone());
                    affected += 1;
                }
            }
        }
        Ok(affected)
    }

    fn to_source_rows(&self) -> Vec<SourceRow> {
        self.rows
            .iter()
            .map(|row| {
                let mut out = SourceRow::new();
                for (column, value) in self.columns.iter().zip(row) {
                    out.push(column, value.clone());
                }
                out
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, TableData>,
    upserts: HashMap<String, usize>,
    /// Table name to the 1-based upsert number that fails
    fail_upsert: HashMap<String, usize>,
}

/// Shared handle; clones see the same tables
#[derive(Debug, Clone, Default)]
pub struct InMemoryDestination {
    state: Arc<Mutex<State>>,
}

impl InMemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate `table`, e.g. to observe what a refresh deletes
    pub fn seed(&self, table: &str, columns: &[&str], rows: Vec<Vec<SqlValue>>) {
        let mut state = self.state.lock();
        let data = state.tables.entry(table.to_string()).or_default();
        data.columns = columns.iter().map(|c| c.to_string()).collect();
        for row in rows {
            // Seeded rows are keyed by position so they never collide
            data.index.insert(vec![format!("seed:{}", data.rows.len())], data.rows.len());
            data.rows.push(row);
        }
    }

    /// Make the `nth` (1-based) upsert against `table` fail from now on
    pub fn fail_upsert_number(&self, table: &str, nth: usize) {
        let mut state = self.state.lock();
        state.upserts.insert(table.to_string(), 0);
        state.fail_upsert.insert(table.to_string(), nth);
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state
            .lock()
            .tables
            .get(table)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    /// Current rows of `table` as named columns
    pub fn rows(&self, table: &str) -> Vec<SourceRow> {
        self.state
            .lock()
            .tables
            .get(table)
            .map(TableData::to_source_rows)
            .unwrap_or_default()
    }

    /// Upsert statements executed against `table`
    pub fn upsert_count(&self, table: &str) -> usize {
        self.state.lock().upserts.get(table).copied().unwrap_or(0)
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().tables.keys().cloned().collect();
        names.sort();
        names
    }

    fn check_injected_failure(state: &mut State, table: &str) -> Result<(), DestinationError> {
        let count = state.upserts.entry(table.to_string()).or_insert(0);
        *count += 1;
        match state.fail_upsert.get(table) {
            Some(&nth) if *count == nth => Err(DestinationError::query(
                table,
                format!("injected failure on upsert {nth}"),
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl DestinationStore for InMemoryDestination {
    fn name(&self) -> &str {
        "memory"
    }

    async fn begin_refresh(
        &self,
        table: &str,
        mode: RefreshMode,
    ) -> Result<Box<dyn RefreshSession>, DestinationError> {
        let staged = match mode {
            RefreshMode::DeleteThenInsert => None,
            RefreshMode::Atomic => Some(
                self.state
                    .lock()
                    .tables
                    .get(table)
                    .cloned()
                    .unwrap_or_default(),
            ),
        };
        debug!(table = table, mode = %mode, "Opened in-memory refresh session");
        Ok(Box::new(MemoryRefreshSession {
            state: Arc::clone(&self.state),
            table: table.to_string(),
            staged,
        }))
    }
}

struct MemoryRefreshSession {
    state: Arc<Mutex<State>>,
    table: String,
    /// Working copy for atomic refreshes; `None` writes straight through
    staged: Option<TableData>,
}

#[async_trait]
impl RefreshSession for MemoryRefreshSession {
    async fn delete_all(&mut self) -> Result<u64, DestinationError> {
        if let Some(staged) = self.staged.as_mut() {
            return Ok(staged.clear());
        }
        let mut state = self.state.lock();
        Ok(state
            .tables
            .get_mut(&self.table)
            .map(TableData::clear)
            .unwrap_or(0))
    }

    async fn upsert(&mut self, statement: &UpsertStatement) -> Result<u64, DestinationError> {
        let mut state = self.state.lock();
        InMemoryDestination::check_injected_failure(&mut state, &self.table)?;
        match self.staged.as_mut() {
            Some(staged) => staged.apply(statement),
            None => state
                .tables
                .entry(self.table.clone())
                .or_default()
                .apply(statement),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), DestinationError> {
        let MemoryRefreshSession { state, table, staged } = *self;
        if let Some(staged) = staged {
            state.lock().tables.insert(table, staged);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DestinationError> {
        Ok(())
    }
}
