//! Top-level error type surfaced by the engine and the sync jobs.
//!
//! Each layer keeps its own typed error; `SyncError` only unifies them so a job
//! can use `?` across fetch, mapping and refresh.

use crate::config::ConfigurationError;
use crate::destination::DestinationError;
use crate::query_builder::QueryBuilderError;
use crate::source::{FailoverError, MappingError, SourceError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Failover error: {0}")]
    Failover(#[from] FailoverError),

    #[error("Row mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Destination error: {0}")]
    Destination(#[from] DestinationError),

    #[error("Statement error: {0}")]
    QueryBuilder(#[from] QueryBuilderError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Every one of the {ids} ids fanned out by {job} failed")]
    FanOutFailed { job: String, ids: usize },

    #[error("Unknown job '{0}'")]
    UnknownJob(String),
}

impl SyncError {
    /// Short classification used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Source(_) => "source",
            SyncError::Failover(e) if e.is_shutdown() => "shutting_down",
            SyncError::Failover(_) => "source_unavailable",
            SyncError::Mapping(_) => "mapping",
            SyncError::Destination(_) => "destination",
            SyncError::QueryBuilder(_) => "statement",
            SyncError::Configuration(_) => "configuration",
            SyncError::FanOutFailed { .. } => "fan_out_failed",
            SyncError::UnknownJob(_) => "unknown_job",
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
