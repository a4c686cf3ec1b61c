//! # Destination Store
//!
//! The local materialized store the refresh pipeline writes snapshots into.
//!
//! A refresh opens a [`RefreshSession`] for one table, deletes its contents,
//! writes the new snapshot with one upsert per chunk and then commits. How much
//! of that is atomic depends on the [`RefreshMode`]:
//!
//! - [`RefreshMode::DeleteThenInsert`] commits every statement on its own; a
//!   failure part-way leaves the table partially refreshed until the next run
//! - [`RefreshMode::Atomic`] runs the delete and every chunk in one transaction
//!   and rolls back on failure, so readers see either the old or the new snapshot
//!
//! Implementations: [`PgDestination`] for PostgreSQL and [`InMemoryDestination`]
//! for dry runs and tests.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryDestination;
pub use postgres::{PgDestination, PgDestinationSettings};

use crate::database::PgErrorCode;
use crate::query_builder::{QueryBuilderError, UpsertStatement};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DestinationError {
    #[error("Destination connection error: {0}")]
    Connection(String),

    #[error("Destination query on {table} failed: {message}")]
    Query {
        table: String,
        code: Option<String>,
        message: String,
    },

    #[error("Invalid upsert statement: {0}")]
    Statement(#[from] QueryBuilderError),

    #[error("Value for column {column} of {table} cannot be written: {reason}")]
    UnsupportedValue {
        table: String,
        column: String,
        reason: String,
    },

    #[error("Destination migration failed: {0}")]
    Migration(String),
}

impl DestinationError {
    pub fn query(table: &str, message: impl Into<String>) -> Self {
        DestinationError::Query {
            table: table.to_string(),
            code: None,
            message: message.into(),
        }
    }

    /// Classify a sqlx failure raised while writing `table`
    pub fn from_sqlx(table: &str, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(e) => DestinationError::Connection(e.to_string()),
            sqlx::Error::Tls(e) => DestinationError::Connection(e.to_string()),
            sqlx::Error::PoolTimedOut => {
                DestinationError::Connection("timed out acquiring a destination connection".to_string())
            }
            sqlx::Error::PoolClosed => DestinationError::Connection("destination pool closed".to_string()),
            sqlx::Error::Database(db) => {
                let code = db.code().map(|c| c.to_string());
                if code
                    .as_deref()
                    .is_some_and(|c| c.starts_with(PgErrorCode::CONNECTION_EXCEPTION_CLASS))
                {
                    return DestinationError::Connection(db.message().to_string());
                }
                DestinationError::Query {
                    table: table.to_string(),
                    code,
                    message: db.message().to_string(),
                }
            }
            other => DestinationError::query(table, other.to_string()),
        }
    }

    /// SQLSTATE reported by the destination, when there is one
    pub fn code(&self) -> Option<&str> {
        match self {
            DestinationError::Query { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// How a refresh is applied to its table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    /// Per-statement commits, accepts a partial window on failure
    #[default]
    DeleteThenInsert,
    /// Delete and all chunks in a single transaction
    Atomic,
}

impl RefreshMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshMode::DeleteThenInsert => "delete_then_insert",
            RefreshMode::Atomic => "atomic",
        }
    }
}

impl fmt::Display for RefreshMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefreshMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delete_then_insert" => Ok(RefreshMode::DeleteThenInsert),
            "atomic" => Ok(RefreshMode::Atomic),
            other => Err(format!(
                "unknown refresh mode '{other}', expected delete_then_insert or atomic"
            )),
        }
    }
}

/// A store that can host refresh sessions
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Open a session that replaces the contents of `table`
    async fn begin_refresh(
        &self,
        table: &str,
        mode: RefreshMode,
    ) -> Result<Box<dyn RefreshSession>, DestinationError>;

    async fn ping(&self) -> Result<(), DestinationError> {
        Ok(())
    }

    async fn close(&self) {}
}

/// One in-progress table refresh
#[async_trait]
pub trait RefreshSession: Send {
    /// Remove every row of the table; returns the number removed
    async fn delete_all(&mut self) -> Result<u64, DestinationError>;

    /// Execute one multi-row upsert; returns rows affected
    async fn upsert(&mut self, statement: &UpsertStatement) -> Result<u64, DestinationError>;

    async fn commit(self: Box<Self>) -> Result<(), DestinationError>;

    async fn rollback(self: Box<Self>) -> Result<(), DestinationError>;
}
