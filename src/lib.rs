#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Govsync Core
//!
//! Resilient synchronization engine that replicates computed governance datasets
//! (committee membership and votes, treasury withdrawals, protocol totals,
//! proposals, proposal votes, voting summaries and DRep registrations) from a set
//! of flaky read-replica sources into a local materialized store.
//!
//! ## Architecture
//!
//! Data flows in one direction:
//!
//! ```text
//! sources -> executor / failover -> (fan-out) -> refresh pipeline -> destination tables
//! ```
//!
//! - Every remote call goes through the [`source::QueryExecutor`]: a global
//!   concurrency throttle, a per-attempt deadline, and exponential backoff for
//!   transient failures.
//! - The [`source::FailoverCoordinator`] walks the configured sources in priority
//!   order, skipping any whose circuit breaker is open.
//! - Keyed datasets fan out per id through [`sync::FanOutProcessor`] under their own
//!   concurrency and pacing limits.
//! - [`sync::BatchRefresher`] replaces a table's contents: delete, dedupe by
//!   natural key, chunk, and upsert with parameterized multi-row statements.
//!
//! ## Module Organization
//!
//! - [`config`] - TOML configuration, environment overlays and validation
//! - [`constants`] - Operational defaults, job and table names
//! - [`database`] - SQL values, SQLSTATE classification and destination migrations
//! - [`destination`] - The materialized store (PostgreSQL and in-memory)
//! - [`engine`] - [`SyncEngine`], the context object every job runs against
//! - [`error`] - Unified [`SyncError`]
//! - [`jobs`] - One job per dataset, the runner state machine and the scheduler
//! - [`logging`] - Structured `tracing` setup
//! - [`models`] - Typed dataset records and their row mappers
//! - [`query_builder`] - Multi-row upsert statement builder
//! - [`resilience`] - Circuit breakers, global throttle and retry policy
//! - [`source`] - Read replicas, the connector seam, executor and failover
//! - [`sync`] - Fan-out processing and the batch refresh pipeline
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use govsync_core::config::ConfigManager;
//! use govsync_core::engine::SyncEngine;
//! use govsync_core::jobs::JobRegistry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::load()?;
//! let engine = SyncEngine::bootstrap(&config, false).await?;
//! let registry = JobRegistry::from_config(config.config());
//!
//! registry.trigger("totals", &engine).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod destination;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod query_builder;
pub mod resilience;
pub mod source;
pub mod sync;

pub use config::{ConfigManager, ConfigurationError, GovsyncConfig};
pub use engine::{EngineSettings, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use jobs::{JobRegistry, JobRunner, JobScheduler, SyncJob, TriggerOutcome};
