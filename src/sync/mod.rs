//! # Sync Pipeline
//!
//! The two stages between a fetched snapshot and a refreshed table:
//!
//! - [`fan_out`] - per-id fetching in paced, concurrency-bounded batches
//! - [`refresh`] - delete, deduplicate, chunk and upsert into the destination

pub mod fan_out;
pub mod refresh;

pub use fan_out::{FanOutFailure, FanOutProcessor, FanOutReport, FanOutSettings};
pub use refresh::{
    content_hash, dedupe, BatchRefresher, BatchUpsertSpec, DedupeKey, DedupePolicy, RefreshReport,
    UpsertRecord,
};
