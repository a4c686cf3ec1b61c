//! # Global Concurrency Throttle
//!
//! A single process-wide counting semaphore bounding simultaneously open remote
//! operations across every job. Individual jobs bound their own fan-out, but
//! several jobs running at once could still exhaust the replicas' connection
//! pools without a shared cap.
//!
//! Acquisition waits when the cap is reached. Permits release on drop, so every
//! exit path of a remote call (success, error, timeout, cancellation) returns
//! its slot.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Global throttle is closed")]
pub struct ThrottleClosed;

/// Counters describing throttle usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleStats {
    pub capacity: usize,
    pub in_flight: usize,
    pub peak_in_flight: usize,
    pub total_acquired: u64,
}

#[derive(Debug)]
pub struct GlobalThrottle {
    semaphore: Semaphore,
    capacity: usize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    total_acquired: AtomicU64,
}

impl GlobalThrottle {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        info!(capacity = capacity, "🚦 Global concurrency throttle initialized");

        Self {
            semaphore: Semaphore::new(capacity),
            capacity,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            total_acquired: AtomicU64::new(0),
        }
    }

    pub fn shared(capacity: usize) -> Arc<Self> {
        Arc::new(Self::new(capacity))
    }

    /// Wait for a slot. Fails only once the throttle has been closed for shutdown.
    pub async fn acquire(&self) -> Result<ThrottlePermit<'_>, ThrottleClosed> {
        if self.semaphore.available_permits() == 0 {
            debug!(capacity = self.capacity, "Global throttle saturated, waiting for a slot");
        }

        let permit = self.semaphore.acquire().await.map_err(|_| ThrottleClosed)?;

        let now_in_flight = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(now_in_flight, Ordering::AcqRel);
        self.total_acquired.fetch_add(1, Ordering::Relaxed);

        Ok(ThrottlePermit {
            _permit: permit,
            in_flight: &self.in_flight,
        })
    }

    /// Stop handing out permits; waiters and future callers get [`ThrottleClosed`]
    pub fn close(&self) {
        info!("🚦 Global throttle closed");
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> ThrottleStats {
        ThrottleStats {
            capacity: self.capacity,
            in_flight: self.in_flight.load(Ordering::Acquire),
            peak_in_flight: self.peak_in_flight.load(Ordering::Acquire),
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
        }
    }
}

/// Scoped slot in the global throttle
#[derive(Debug)]
pub struct ThrottlePermit<'a> {
    _permit: SemaphorePermit<'a>,
    in_flight: &'a AtomicUsize,
}

impl Drop for ThrottlePermit<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
