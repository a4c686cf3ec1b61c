//! # Failover Coordinator
//!
//! Tries sources strictly in priority order until one answers, consulting and
//! updating the circuit breaker registry around every attempt.
//!
//! When every source's breaker is open the primary is attempted anyway; a sync
//! that makes no attempt at all would never observe recovery.

use super::{FetchRequest, QueryExecutor, Source, SourceError};
use crate::resilience::CircuitBreakerRegistry;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailoverSettings {
    /// When false, the first failing source ends the call
    pub enabled: bool,
    /// Pause before moving on to the next candidate
    pub inter_source_delay: Duration,
}

impl Default for FailoverSettings {
    fn default() -> Self {
        use crate::constants::defaults;
        Self {
            enabled: defaults::ENABLE_FAILOVER,
            inter_source_delay: Duration::from_millis(defaults::FAILOVER_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum FailoverError {
    #[error("No sources configured for {operation}")]
    NoSources { operation: String },

    #[error("All sources unavailable for {operation} (attempted: {attempted:?}): {last_error}")]
    AllSourcesUnavailable {
        operation: String,
        attempted: Vec<String>,
        #[source]
        last_error: SourceError,
    },

    #[error("Engine shutting down, {operation} abandoned")]
    ShuttingDown { operation: String },
}

impl FailoverError {
    pub fn operation(&self) -> &str {
        match self {
            FailoverError::NoSources { operation }
            | FailoverError::AllSourcesUnavailable { operation, .. }
            | FailoverError::ShuttingDown { operation } => operation,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, FailoverError::ShuttingDown { .. })
    }
}

#[derive(Debug)]
pub struct FailoverCoordinator {
    executor: Arc<QueryExecutor>,
    breakers: Arc<CircuitBreakerRegistry>,
    settings: FailoverSettings,
}

impl FailoverCoordinator {
    pub fn new(
        executor: Arc<QueryExecutor>,
        breakers: Arc<CircuitBreakerRegistry>,
        settings: FailoverSettings,
    ) -> Self {
        Self {
            executor,
            breakers,
            settings,
        }
    }

    pub fn settings(&self) -> &FailoverSettings {
        &self.settings
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn executor(&self) -> &Arc<QueryExecutor> {
        &self.executor
    }

    /// Sources eligible for this call, in order
    fn candidates<'a>(&self, sources: &'a [Source], operation: &str) -> Vec<&'a Source> {
        let eligible: Vec<&Source> = sources
            .iter()
            .filter(|source| {
                let open = self.breakers.is_open(&source.name);
                if open {
                    debug!(source = %source.name, operation = operation, "Skipping source with open circuit");
                }
                !open
            })
            .collect();

        if !eligible.is_empty() {
            return eligible;
        }

        // Every breaker is open; fall back to the primary rather than doing nothing
        warn!(
            source = %sources[0].name,
            operation = operation,
            "⚠️ All source circuits open, forcing attempt on primary"
        );
        vec![&sources[0]]
    }

    /// Execute `request` against the first source that succeeds
    pub async fn fetch_with_failover<T: Send>(
        &self,
        sources: &[Source],
        request: &FetchRequest<T>,
    ) -> Result<Vec<T>, FailoverError> {
        let operation = request.label().to_string();
        if sources.is_empty() {
            error!(operation = %operation, "❌ No sources configured");
            return Err(FailoverError::NoSources { operation });
        }

        let candidates = self.candidates(sources, &operation);
        let mut attempted = Vec::with_capacity(candidates.len());
        let mut last_error = None;

        for (position, source) in candidates.iter().enumerate() {
            match self.executor.execute(source, request).await {
                Ok(records) => {
                    self.breakers.record_success(&source.name);
                    if position > 0 {
                        info!(
                            source = %source.name,
                            operation = %operation,
                            failed_before = attempted.len(),
                            "✅ Failover succeeded"
                        );
                    }
                    return Ok(records);
                }
                Err(err) if err.is_shutdown() => {
                    // Not a source failure; leave the breaker alone
                    info!(source = %source.name, operation = %operation, "🛑 Shutting down, abandoning fetch");
                    return Err(FailoverError::ShuttingDown { operation });
                }
                Err(err) if err.is_configuration() => {
                    warn!(source = %source.name, operation = %operation, error = %err, "⚠️ Source not usable, skipping");
                    last_error = Some(err);
                    continue;
                }
                Err(err) => {
                    let failures = self.breakers.record_failure(&source.name);
                    attempted.push(source.name.clone());
                    error!(
                        source = %source.name,
                        operation = %operation,
                        error_kind = err.kind(),
                        consecutive_failures = failures,
                        error = %err,
                        "❌ Source failed"
                    );
                    last_error = Some(err);

                    if !self.settings.enabled {
                        debug!(operation = %operation, "Failover disabled, not trying further sources");
                        break;
                    }
                    if position + 1 < candidates.len() && !self.settings.inter_source_delay.is_zero() {
                        tokio::time::sleep(self.settings.inter_source_delay).await;
                    }
                }
            }
        }

        match last_error {
            Some(last_error) => Err(FailoverError::AllSourcesUnavailable {
                operation,
                attempted,
                last_error,
            }),
            None => Err(FailoverError::NoSources { operation }),
        }
    }
}
