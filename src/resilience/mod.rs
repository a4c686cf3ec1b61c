//! # Resilience Module
//!
//! Fault tolerance primitives shared by every sync job.
//!
//! ## Architecture
//!
//! - **Circuit Breakers**: per-source failure records that make a repeatedly failing
//!   replica ineligible for a cooldown period
//! - **Global Throttle**: a process-wide bound on open remote operations
//! - **Retry Policy**: exponential backoff for transient failures of a single call
//!
//! None of these are ambient globals; the [`SyncEngine`](crate::engine::SyncEngine)
//! owns one instance of each and hands references to the components that need them.
//!
//! ## Usage
//!
//! ```rust
//! use govsync_core::resilience::{CircuitBreakerConfig, CircuitBreakerRegistry};
//! use std::time::Duration;
//!
//! let breakers = CircuitBreakerRegistry::new(CircuitBreakerConfig {
//!     failure_threshold: 3,
//!     cooldown: Duration::from_secs(300),
//! });
//!
//! breakers.record_failure("replica-a");
//! assert!(!breakers.is_open("replica-a"));
//! ```

pub mod circuit_breaker;
pub mod retry;
pub mod throttle;

pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerState, CircuitState,
    SourceCircuitSnapshot,
};
pub use retry::{RetryPolicy, Retryable};
pub use throttle::{GlobalThrottle, ThrottleClosed, ThrottlePermit, ThrottleStats};
