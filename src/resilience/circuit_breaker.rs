//! # Circuit Breaker Implementation
//!
//! Per-source fault isolation. Each source tracks its consecutive failures and
//! the time of the most recent one; a source is *open* (ineligible) while
//! `consecutive_failures >= failure_threshold` and the cooldown has not elapsed
//! since the last failure. Once the cooldown elapses the source is *half-open*:
//! one more attempt is allowed, and a further failure reopens it immediately
//! because the counter is still above the threshold.
//!
//! State lives in memory for the process lifetime and is owned by the
//! [`SyncEngine`](crate::engine::SyncEngine); the map is guarded by a single
//! `parking_lot` mutex held only for the duration of a state transition.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Configuration shared by every per-source breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before the source is opened
    pub failure_threshold: u32,

    /// Time an open source stays ineligible after its last failure
    pub cooldown: Duration,
}

impl CircuitBreakerConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.cooldown.is_zero() {
            return Err("cooldown must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: crate::constants::defaults::CIRCUIT_BREAKER_THRESHOLD,
            cooldown: Duration::from_secs(crate::constants::defaults::CIRCUIT_BREAKER_TIMEOUT_SECONDS),
        }
    }
}

/// Circuit breaker states derived from a source's failure record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - below the failure threshold
    Closed,
    /// Failing fast - threshold reached and cooldown still running
    Open,
    /// Cooldown elapsed with the counter still at threshold; next attempt decides
    HalfOpen,
}

/// Failure record for one source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CircuitBreakerState {
    pub consecutive_failures: u32,
    pub last_failure_at: Option<Instant>,
}

impl CircuitBreakerState {
    fn circuit_state(&self, config: &CircuitBreakerConfig, now: Instant) -> CircuitState {
        if self.consecutive_failures < config.failure_threshold {
            return CircuitState::Closed;
        }
        match self.last_failure_at {
            Some(at) if now.saturating_duration_since(at) < config.cooldown => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }
}

/// Point-in-time view of one source's breaker, for logging and diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceCircuitSnapshot {
    pub source_name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Remaining cooldown when open
    pub reopens_in: Option<Duration>,
}

/// Registry of per-source breaker state
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    states: Mutex<HashMap<String, CircuitBreakerState>>,
}

impl CircuitBreakerRegistry {
    /// Create a new registry with the given configuration
    pub fn new(config: CircuitBreakerConfig) -> Self {
        info!(
            failure_threshold = config.failure_threshold,
            cooldown_seconds = config.cooldown.as_secs(),
            "🛡️ Circuit breaker registry initialized"
        );

        Self {
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Whether `source` is currently ineligible
    pub fn is_open(&self, source: &str) -> bool {
        self.state(source) == CircuitState::Open
    }

    /// Current derived state of `source`; unknown sources are closed
    pub fn state(&self, source: &str) -> CircuitState {
        let now = Instant::now();
        self.states
            .lock()
            .get(source)
            .map(|s| s.circuit_state(&self.config, now))
            .unwrap_or(CircuitState::Closed)
    }

    /// Raw failure record for `source`
    pub fn failure_record(&self, source: &str) -> CircuitBreakerState {
        self.states.lock().get(source).copied().unwrap_or_default()
    }

    /// Record a failed attempt; returns the new consecutive failure count
    pub fn record_failure(&self, source: &str) -> u32 {
        let now = Instant::now();
        let mut states = self.states.lock();
        let entry = states.entry(source.to_string()).or_default();
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        entry.last_failure_at = Some(now);
        let failures = entry.consecutive_failures;
        drop(states);

        if failures == self.config.failure_threshold {
            warn!(
                source = source,
                consecutive_failures = failures,
                cooldown_seconds = self.config.cooldown.as_secs(),
                "🔴 Circuit breaker opened"
            );
        } else if failures > self.config.failure_threshold {
            warn!(
                source = source,
                consecutive_failures = failures,
                "🔴 Half-open probe failed, circuit breaker reopened"
            );
        } else {
            debug!(source = source, consecutive_failures = failures, "Source failure recorded");
        }

        failures
    }

    /// Record a successful attempt, clearing the failure record unconditionally
    pub fn record_success(&self, source: &str) {
        let previous = self.states.lock().remove(source);

        if let Some(previous) = previous {
            if previous.consecutive_failures >= self.config.failure_threshold {
                info!(
                    source = source,
                    previous_failures = previous.consecutive_failures,
                    "🟢 Circuit breaker closed (recovered)"
                );
            }
        }
    }

    /// Snapshot of every source that has a failure record
    pub fn snapshot(&self) -> Vec<SourceCircuitSnapshot> {
        let now = Instant::now();
        let states = self.states.lock();
        let mut snapshot: Vec<_> = states
            .iter()
            .map(|(name, s)| {
                let state = s.circuit_state(&self.config, now);
                let reopens_in = match (state, s.last_failure_at) {
                    (CircuitState::Open, Some(at)) => {
                        Some(self.config.cooldown.saturating_sub(now.saturating_duration_since(at)))
                    }
                    _ => None,
                };
                SourceCircuitSnapshot {
                    source_name: name.clone(),
                    state,
                    consecutive_failures: s.consecutive_failures,
                    reopens_in,
                }
            })
            .collect();
        snapshot.sort_by(|a, b| a.source_name.cmp(&b.source_name));
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(threshold: u32, cooldown_secs: u64) -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown: Duration::from_secs(cooldown_secs),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_failures() {
        let breakers = registry(3, 300);

        breakers.record_failure("replica-a");
        breakers.record_failure("replica-a");
        assert!(!breakers.is_open("replica-a"));
        assert_eq!(breakers.state("replica-a"), CircuitState::Closed);

        breakers.record_failure("replica-a");
        assert!(breakers.is_open("replica-a"));
        assert!(!breakers.is_open("replica-b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_expiry_makes_source_eligible() {
        let breakers = registry(3, 300);
        for _ in 0..3 {
            breakers.record_failure("replica-a");
        }
        assert!(breakers.is_open("replica-a"));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(breakers.is_open("replica-a"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!breakers.is_open("replica-a"));
        assert_eq!(breakers.state("replica-a"), CircuitState::HalfOpen);

        // A failed probe reopens immediately
        breakers.record_failure("replica-a");
        assert!(breakers.is_open("replica-a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_immediately() {
        let breakers = registry(3, 300);
        for _ in 0..5 {
            breakers.record_failure("replica-a");
        }
        assert!(breakers.is_open("replica-a"));

        breakers.record_success("replica-a");
        assert!(!breakers.is_open("replica-a"));
        assert_eq!(breakers.failure_record("replica-a").consecutive_failures, 0);
        assert_eq!(breakers.failure_record("replica-a").last_failure_at, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reports_remaining_cooldown() {
        let breakers = registry(1, 60);
        breakers.record_failure("replica-b");
        tokio::time::advance(Duration::from_secs(20)).await;

        let snapshot = breakers.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].state, CircuitState::Open);
        assert_eq!(snapshot[0].reopens_in, Some(Duration::from_secs(40)));
    }

    #[test]
    fn test_config_validation() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());
        let invalid = CircuitBreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());
        let invalid = CircuitBreakerConfig {
            cooldown: Duration::ZERO,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());
    }
}
