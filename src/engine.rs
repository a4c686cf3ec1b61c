//! # Sync Engine
//!
//! The explicit context every sync job runs against. It owns one instance of
//! each shared component:
//!
//! - the ordered [`SourceRegistry`], fixed at startup
//! - the per-source [`CircuitBreakerRegistry`]
//! - the process-wide [`GlobalThrottle`]
//! - the [`QueryExecutor`] and the [`FailoverCoordinator`] built on it
//! - the [`BatchRefresher`] writing into the destination store
//!
//! Nothing here is global; tests build as many independent engines as they like.

use crate::config::{ConfigManager, GovsyncConfig};
use crate::constants::defaults;
use crate::destination::{
    DestinationError, DestinationStore, InMemoryDestination, PgDestination, RefreshMode,
};
use crate::error::SyncResult;
use crate::logging::log_source_operation;
use crate::resilience::{CircuitBreakerConfig, CircuitBreakerRegistry, GlobalThrottle, RetryPolicy};
use crate::source::{
    FailoverCoordinator, FailoverError, FailoverSettings, FetchRequest, PostgresConnector,
    QueryExecutor, QueryTimeouts, SourceConnector, SourceRegistry,
};
use crate::sync::{
    BatchRefresher, FanOutProcessor, FanOutReport, FanOutSettings, RefreshReport, UpsertRecord,
};
use serde::Serialize;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Tunables the engine needs, independent of how they were loaded
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub schema: String,
    pub retry: RetryPolicy,
    pub timeouts: QueryTimeouts,
    pub failover: FailoverSettings,
    pub circuit_breaker: CircuitBreakerConfig,
    pub max_concurrent_operations: usize,
    /// Shared fan-out pacing; jobs supply their own batch size
    pub fan_out: FanOutSettings,
    pub upsert_chunk_size: usize,
    pub refresh_mode: RefreshMode,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            schema: defaults::SCHEMA.to_string(),
            retry: RetryPolicy::default(),
            timeouts: QueryTimeouts::default(),
            failover: FailoverSettings::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            max_concurrent_operations: defaults::MAX_CONCURRENT_DB_OPERATIONS,
            fan_out: FanOutSettings::default(),
            upsert_chunk_size: defaults::UPSERT_CHUNK_SIZE,
            refresh_mode: RefreshMode::default(),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &GovsyncConfig) -> Self {
        Self {
            schema: config.sync.schema.clone(),
            retry: config.sync.retry_policy(),
            timeouts: config.sync.query_timeouts(),
            failover: config.sync.failover_settings(),
            circuit_breaker: config.sync.circuit_breaker(),
            max_concurrent_operations: config.sync.max_concurrent_db_operations,
            fan_out: FanOutSettings {
                batch_size: defaults::FAN_OUT_BATCH_SIZE,
                concurrency: config.fan_out.concurrency,
                inter_batch_delay: Duration::from_millis(config.fan_out.inter_batch_delay_ms),
            },
            upsert_chunk_size: config.destination.upsert_chunk_size,
            refresh_mode: config.destination.refresh_mode,
        }
    }

    pub fn builder() -> EngineSettingsBuilder {
        EngineSettingsBuilder::default()
    }
}

/// Builder for [`EngineSettings`], mostly used by tests and embedders
#[derive(Debug, Default)]
pub struct EngineSettingsBuilder {
    settings: EngineSettings,
}

impl EngineSettingsBuilder {
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.settings.schema = schema.into();
        self
    }

    pub fn retry(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.settings.retry = RetryPolicy::new(max_attempts, base_delay);
        self
    }

    pub fn timeouts(mut self, connection: Duration, command: Duration) -> Self {
        self.settings.timeouts = QueryTimeouts { connection, command };
        self
    }

    pub fn failover(mut self, enabled: bool, inter_source_delay: Duration) -> Self {
        self.settings.failover = FailoverSettings {
            enabled,
            inter_source_delay,
        };
        self
    }

    pub fn circuit_breaker(mut self, failure_threshold: u32, cooldown: Duration) -> Self {
        self.settings.circuit_breaker = CircuitBreakerConfig {
            failure_threshold,
            cooldown,
        };
        self
    }

    pub fn max_concurrent_operations(mut self, capacity: usize) -> Self {
        self.settings.max_concurrent_operations = capacity;
        self
    }

    pub fn fan_out(mut self, concurrency: usize, inter_batch_delay: Duration) -> Self {
        self.settings.fan_out.concurrency = concurrency;
        self.settings.fan_out.inter_batch_delay = inter_batch_delay;
        self
    }

    pub fn upsert_chunk_size(mut self, chunk_size: usize) -> Self {
        self.settings.upsert_chunk_size = chunk_size;
        self
    }

    pub fn refresh_mode(mut self, mode: RefreshMode) -> Self {
        self.settings.refresh_mode = mode;
        self
    }

    pub fn build(self) -> EngineSettings {
        self.settings
    }
}

/// Outcome of a reachability probe against one source
#[derive(Debug, Clone, Serialize)]
pub struct SourceProbe {
    pub source: String,
    pub reachable: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

pub struct SyncEngine {
    settings: EngineSettings,
    sources: SourceRegistry,
    breakers: Arc<CircuitBreakerRegistry>,
    throttle: Arc<GlobalThrottle>,
    executor: Arc<QueryExecutor>,
    coordinator: FailoverCoordinator,
    refresher: BatchRefresher,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("schema", &self.settings.schema)
            .field("sources", &self.sources.names())
            .field("throttle", &self.throttle.stats())
            .field("destination", &self.refresher.destination().name())
            .finish()
    }
}

impl SyncEngine {
    /// Wire every component from explicit parts
    pub fn new(
        settings: EngineSettings,
        sources: SourceRegistry,
        connector: Arc<dyn SourceConnector>,
        destination: Arc<dyn DestinationStore>,
    ) -> Self {
        let breakers = Arc::new(CircuitBreakerRegistry::new(settings.circuit_breaker));
        let throttle = GlobalThrottle::shared(settings.max_concurrent_operations);
        let executor = Arc::new(QueryExecutor::new(
            connector,
            Arc::clone(&throttle),
            settings.retry,
            settings.timeouts,
        ));
        let coordinator = FailoverCoordinator::new(
            Arc::clone(&executor),
            Arc::clone(&breakers),
            settings.failover,
        );
        let refresher = BatchRefresher::new(destination, settings.upsert_chunk_size, settings.refresh_mode);

        info!(
            schema = %settings.schema,
            sources = ?sources.names(),
            max_concurrent_operations = settings.max_concurrent_operations,
            failover_enabled = settings.failover.enabled,
            refresh_mode = %settings.refresh_mode,
            "🚀 Sync engine initialized"
        );

        Self {
            settings,
            sources,
            breakers,
            throttle,
            executor,
            coordinator,
            refresher,
        }
    }

    /// Build from loaded configuration with PostgreSQL sources.
    ///
    /// With `dry_run` the refreshes land in an in-memory store instead of the
    /// configured destination database.
    pub async fn bootstrap(config_manager: &ConfigManager, dry_run: bool) -> SyncResult<Self> {
        let config = config_manager.config();
        let connector: Arc<dyn SourceConnector> =
            Arc::new(PostgresConnector::new(config.sync.source_pool_settings()));

        let destination: Arc<dyn DestinationStore> = if dry_run {
            info!("🧪 Dry run: refreshing into an in-memory destination");
            Arc::new(InMemoryDestination::new())
        } else {
            Arc::new(PgDestination::connect(&config.destination_settings()).await?)
        };

        let sources = config.source_registry();
        if sources.is_empty() {
            warn!("⚠️ No usable sources configured; every job will fail until one is added");
        }

        Ok(Self::new(
            EngineSettings::from_config(config),
            sources,
            connector,
            destination,
        ))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Schema qualifying every source-side function
    pub fn schema(&self) -> &str {
        &self.settings.schema
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn throttle(&self) -> &Arc<GlobalThrottle> {
        &self.throttle
    }

    pub fn executor(&self) -> &Arc<QueryExecutor> {
        &self.executor
    }

    pub fn coordinator(&self) -> &FailoverCoordinator {
        &self.coordinator
    }

    pub fn refresher(&self) -> &BatchRefresher {
        &self.refresher
    }

    /// Run `request` against the configured sources in failover order
    pub async fn fetch<T: Send>(&self, request: &FetchRequest<T>) -> Result<Vec<T>, FailoverError> {
        self.coordinator
            .fetch_with_failover(self.sources.ordered(), request)
            .await
    }

    /// Fetch once per id through failover, `batch_size` ids at a time.
    ///
    /// Fails only when the engine shuts down mid-way; per-id failures are in
    /// the report.
    pub async fn fan_out<K, T, F>(
        &self,
        label: &str,
        ids: Vec<K>,
        batch_size: usize,
        make_request: F,
    ) -> Result<FanOutReport<K, T>, FailoverError>
    where
        K: Clone + Eq + Hash + Display,
        T: Send,
        F: Fn(&K) -> FetchRequest<T>,
    {
        let processor = FanOutProcessor::new(self.settings.fan_out.with_batch_size(batch_size));
        processor
            .process(label, ids, |id| {
                let request = make_request(&id);
                async move { self.fetch(&request).await }
            })
            .await
    }

    /// Replace the record type's table with `records`
    pub async fn refresh<R: UpsertRecord>(&self, records: Vec<R>) -> Result<RefreshReport, DestinationError> {
        self.refresher.refresh(records).await
    }

    /// Ping every configured source; informational only, breakers are untouched
    pub async fn probe_sources(&self) -> Vec<SourceProbe> {
        let probes = self.sources.ordered().iter().map(|source| async move {
            match self.executor.ping(source).await {
                Ok(latency) => {
                    let latency_ms = latency.as_millis() as u64;
                    log_source_operation(&source.name, "ping", "reachable", Some(latency_ms), None);
                    SourceProbe {
                        source: source.name.clone(),
                        reachable: true,
                        latency_ms: Some(latency_ms),
                        error: None,
                    }
                }
                Err(err) => {
                    warn!(source = %source.name, error = %err, "⚠️ Source unreachable");
                    SourceProbe {
                        source: source.name.clone(),
                        reachable: false,
                        latency_ms: None,
                        error: Some(err.to_string()),
                    }
                }
            }
        });
        futures::future::join_all(probes).await
    }

    /// Close the throttle and release source and destination pools
    pub async fn shutdown(&self) {
        info!("🛑 Shutting down sync engine");
        self.executor.shutdown().await;
        self.refresher.destination().close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::InMemoryDestination;
    use crate::source::{Source, SourceError, SourceRow, SourceStatement};
    use async_trait::async_trait;

    /// Answers `SELECT n` style statements with one row per source call
    struct NamedConnector {
        down: Vec<&'static str>,
    }

    #[async_trait]
    impl SourceConnector for NamedConnector {
        async fn fetch_rows(
            &self,
            source: &Source,
            statement: &SourceStatement,
        ) -> Result<Vec<SourceRow>, SourceError> {
            if self.down.contains(&source.name.as_str()) {
                return Err(SourceError::Connection {
                    source_name: source.name.clone(),
                    message: "refused".to_string(),
                });
            }
            let id = match statement.params.first() {
                Some(crate::source::QueryParam::Text(id)) => id.clone(),
                _ => "none".to_string(),
            };
            Ok(vec![SourceRow::new()
                .with("source", source.name.as_str())
                .with("id", id)])
        }

        async fn ping(&self, source: &Source) -> Result<(), SourceError> {
            if self.down.contains(&source.name.as_str()) {
                return Err(SourceError::Connection {
                    source_name: source.name.clone(),
                    message: "refused".to_string(),
                });
            }
            Ok(())
        }
    }

    fn engine(down: Vec<&'static str>) -> SyncEngine {
        let sources = SourceRegistry::new(
            vec![
                Source::with_url("a", "postgres://a/db", 1),
                Source::with_url("b", "postgres://b/db", 2),
            ],
            &[],
        );
        let settings = EngineSettings::builder()
            .retry(1, Duration::from_millis(10))
            .failover(true, Duration::ZERO)
            .fan_out(2, Duration::from_millis(100))
            .build();
        SyncEngine::new(
            settings,
            sources,
            Arc::new(NamedConnector { down }),
            Arc::new(InMemoryDestination::new()),
        )
    }

    fn request(id: &str) -> FetchRequest<(String, String)> {
        FetchRequest::new("probe", "SELECT 1", |row| Ok((row.text("source")?, row.text("id")?))).bind(id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_fails_over_to_second_source() {
        let engine = engine(vec!["a"]);
        let rows = engine.fetch(&request("x")).await.unwrap();
        assert_eq!(rows, vec![("b".to_string(), "x".to_string())]);
        assert_eq!(engine.breakers().failure_record("a").consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_collects_per_id_results() {
        let engine = engine(vec![]);
        let ids: Vec<String> = (0..5).map(|i| format!("id{i}")).collect();
        let report = engine.fan_out("probe", ids, 2, |id| request(id)).await.unwrap();
        assert_eq!(report.batches, 3);
        assert_eq!(report.record_count(), 5);
        assert!(!report.has_failures());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_after_shutdown_is_abandoned() {
        let engine = engine(vec![]);
        engine.shutdown().await;

        let ids: Vec<String> = (0..4).map(|i| format!("id{i}")).collect();
        let err = engine.fan_out("probe", ids, 2, |id| request(id)).await.unwrap_err();

        assert!(err.is_shutdown());
        assert_eq!(engine.breakers().failure_record("a").consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_probe_reports_each_source_without_touching_breakers() {
        let engine = engine(vec!["b"]);
        let probes = engine.probe_sources().await;
        assert_eq!(probes.len(), 2);
        assert!(probes[0].reachable);
        assert!(!probes[1].reachable);
        assert_eq!(engine.breakers().failure_record("b").consecutive_failures, 0);
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = GovsyncConfig::default();
        config.fan_out.concurrency = 3;
        config.destination.refresh_mode = RefreshMode::Atomic;
        let settings = EngineSettings::from_config(&config);
        assert_eq!(settings.fan_out.concurrency, 3);
        assert_eq!(settings.refresh_mode, RefreshMode::Atomic);
        assert_eq!(settings.retry.max_attempts, 3);
    }
}
