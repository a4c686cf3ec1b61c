//! # Query Executor
//!
//! Runs one [`FetchRequest`] against one named source:
//!
//! 1. every attempt takes a slot in the [`GlobalThrottle`] for as long as the
//!    connection is in use,
//! 2. every attempt is bounded by a client deadline (connection + command timeout),
//! 3. transient failures are retried with exponential backoff,
//! 4. rows are mapped with the request's typed mapper; a row that fails to map is
//!    logged and skipped rather than failing the fetch.

use super::{FetchRequest, Source, SourceConnector, SourceError, SourceRow};
use crate::resilience::{GlobalThrottle, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Per-call deadlines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryTimeouts {
    pub connection: Duration,
    pub command: Duration,
}

impl QueryTimeouts {
    /// Client-side deadline for one attempt
    pub fn deadline(&self) -> Duration {
        self.connection.saturating_add(self.command)
    }
}

impl Default for QueryTimeouts {
    fn default() -> Self {
        use crate::constants::defaults;
        Self {
            connection: Duration::from_secs(defaults::CONNECTION_TIMEOUT_SECONDS),
            command: Duration::from_secs(defaults::COMMAND_TIMEOUT_SECONDS),
        }
    }
}

pub struct QueryExecutor {
    connector: Arc<dyn SourceConnector>,
    throttle: Arc<GlobalThrottle>,
    retry: RetryPolicy,
    timeouts: QueryTimeouts,
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("retry", &self.retry)
            .field("timeouts", &self.timeouts)
            .field("throttle", &self.throttle.stats())
            .finish()
    }
}

impl QueryExecutor {
    pub fn new(
        connector: Arc<dyn SourceConnector>,
        throttle: Arc<GlobalThrottle>,
        retry: RetryPolicy,
        timeouts: QueryTimeouts,
    ) -> Self {
        Self {
            connector,
            throttle,
            retry,
            timeouts,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn timeouts(&self) -> &QueryTimeouts {
        &self.timeouts
    }

    pub fn throttle(&self) -> &Arc<GlobalThrottle> {
        &self.throttle
    }

    /// Execute `request` on `source`, retrying transient failures
    pub async fn execute<T: Send>(
        &self,
        source: &Source,
        request: &FetchRequest<T>,
    ) -> Result<Vec<T>, SourceError> {
        if !source.is_configured() {
            return Err(SourceError::not_configured(
                &source.name,
                "no connection information",
            ));
        }

        let label = format!("{}@{}", request.label(), source.name);
        let started = Instant::now();
        let rows = self
            .retry
            .run(&label, |attempt| self.attempt(source, request, attempt))
            .await?;

        let fetched = rows.len();
        let records = self.map_rows(source, request, rows);
        debug!(
            source = %source.name,
            operation = request.label(),
            rows = fetched,
            records = records.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "📥 Query executed"
        );
        Ok(records)
    }

    async fn attempt<T>(
        &self,
        source: &Source,
        request: &FetchRequest<T>,
        attempt: u32,
    ) -> Result<Vec<SourceRow>, SourceError> {
        let _permit = self
            .throttle
            .acquire()
            .await
            .map_err(|_| SourceError::shutting_down(&source.name, request.label()))?;

        debug!(source = %source.name, operation = request.label(), attempt = attempt, "Executing source query");

        let deadline = self.timeouts.deadline();
        match tokio::time::timeout(deadline, self.connector.fetch_rows(source, request.statement())).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::timeout(&source.name, request.label(), deadline)),
        }
    }

    fn map_rows<T>(&self, source: &Source, request: &FetchRequest<T>, rows: Vec<SourceRow>) -> Vec<T> {
        let total = rows.len();
        let records: Vec<T> = rows
            .iter()
            .enumerate()
            .filter_map(|(index, row)| match request.map_row(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(
                        source = %source.name,
                        operation = request.label(),
                        row_index = index,
                        error = %e,
                        "⚠️ Skipping row that failed to map"
                    );
                    None
                }
            })
            .collect();

        let skipped = total - records.len();
        if skipped > 0 {
            warn!(
                source = %source.name,
                operation = request.label(),
                skipped = skipped,
                total = total,
                "⚠️ Rows dropped during mapping"
            );
        }
        records
    }

    /// Reachability probe, throttled like any other remote operation
    pub async fn ping(&self, source: &Source) -> Result<Duration, SourceError> {
        let _permit = self
            .throttle
            .acquire()
            .await
            .map_err(|_| SourceError::shutting_down(&source.name, "ping"))?;

        let started = Instant::now();
        let deadline = self.timeouts.connection;
        match tokio::time::timeout(deadline, self.connector.ping(source)).await {
            Ok(result) => result.map(|_| started.elapsed()),
            Err(_) => Err(SourceError::timeout(&source.name, "ping", deadline)),
        }
    }

    /// Stop admitting new attempts and release pooled source connections
    pub async fn shutdown(&self) {
        self.throttle.close();
        self.connector.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MappingError, SourceStatement};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct ScriptedConnector {
        script: Mutex<VecDeque<Result<Vec<SourceRow>, SourceError>>>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl ScriptedConnector {
        fn new(script: Vec<Result<Vec<SourceRow>, SourceError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl SourceConnector for ScriptedConnector {
        async fn fetch_rows(
            &self,
            _source: &Source,
            _statement: &SourceStatement,
        ) -> Result<Vec<SourceRow>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.script.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn ping(&self, _source: &Source) -> Result<(), SourceError> {
            Ok(())
        }
    }

    fn executor(connector: ScriptedConnector, timeouts: QueryTimeouts) -> (QueryExecutor, Arc<ScriptedConnector>) {
        let connector = Arc::new(connector);
        let executor = QueryExecutor::new(
            connector.clone(),
            GlobalThrottle::shared(2),
            RetryPolicy::new(3, Duration::from_millis(100)),
            timeouts,
        );
        (executor, connector)
    }

    fn epoch_request() -> FetchRequest<i64> {
        FetchRequest::new("get_totals", "SELECT * FROM governance.get_totals()", |row| {
            row.i64("epoch_no")
        })
    }

    fn source() -> Source {
        Source::with_url("replica-a", "postgres://u:p@replica-a/db", 0)
    }

    fn transient() -> SourceError {
        SourceError::Transient {
            source_name: "replica-a".to_string(),
            code: "53300".to_string(),
            message: "too many clients".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let rows = vec![SourceRow::new().with("epoch_no", 10_i64)];
        let (executor, connector) = executor(
            ScriptedConnector::new(vec![Err(transient()), Err(transient()), Ok(rows)]),
            QueryTimeouts::default(),
        );
        let start = Instant::now();

        let result = executor.execute(&source(), &epoch_request()).await.unwrap();

        assert_eq!(result, vec![10]);
        assert_eq!(connector.calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_propagates_without_retry() {
        let permanent = SourceError::Query {
            source_name: "replica-a".to_string(),
            code: Some("42883".to_string()),
            message: "function does not exist".to_string(),
        };
        let (executor, connector) = executor(
            ScriptedConnector::new(vec![Err(permanent.clone())]),
            QueryTimeouts::default(),
        );

        let err = executor.execute(&source(), &epoch_request()).await.unwrap_err();

        assert_eq!(err, permanent);
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bad_rows_are_skipped() {
        let rows = vec![
            SourceRow::new().with("epoch_no", 10_i64),
            SourceRow::new().with("epoch_no", "not a number"),
            SourceRow::new(),
            SourceRow::new().with("epoch_no", 12_i64),
        ];
        let (executor, _) = executor(ScriptedConnector::new(vec![Ok(rows)]), QueryTimeouts::default());

        let result = executor.execute(&source(), &epoch_request()).await.unwrap();

        assert_eq!(result, vec![10, 12]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expiry_is_a_timeout() {
        let connector = ScriptedConnector {
            delay: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let timeouts = QueryTimeouts {
            connection: Duration::from_secs(1),
            command: Duration::from_secs(2),
        };
        let (executor, connector) = executor(connector, timeouts);

        let err = executor.execute(&source(), &epoch_request()).await.unwrap_err();

        assert!(matches!(err, SourceError::Timeout { .. }));
        assert!(err.is_transient());
        assert_eq!(connector.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unconfigured_source_is_rejected_without_io() {
        let (executor, connector) = executor(ScriptedConnector::default(), QueryTimeouts::default());

        let err = executor
            .execute(&Source::new("replica-z", None, 0), &epoch_request())
            .await
            .unwrap_err();

        assert!(err.is_configuration());
        assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_closed_throttle_refuses_without_io() {
        let (executor, connector) = executor(ScriptedConnector::default(), QueryTimeouts::default());
        executor.throttle().close();

        let err = executor.execute(&source(), &epoch_request()).await.unwrap_err();

        assert!(err.is_shutdown());
        assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
        assert!(executor.ping(&source()).await.unwrap_err().is_shutdown());
    }

    #[test]
    fn test_mapping_error_type_is_reported() {
        let row = SourceRow::new().with("epoch_no", "x");
        assert!(matches!(
            epoch_request().map_row(&row),
            Err(MappingError::TypeMismatch { .. })
        ));
    }
}
