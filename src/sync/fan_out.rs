//! # Fan-out Batch Processor
//!
//! Runs one keyed query per id for datasets that cannot be fetched in bulk.
//!
//! Ids are processed in fixed-size batches, strictly one batch after another.
//! Inside a batch, ids run concurrently under a batch-local semaphore, and a
//! fixed pause separates consecutive batches (never after the last one). A
//! failing id contributes an empty result instead of failing its batch. A
//! failure that says the engine is going away ends the fan-out after the
//! current batch; no further batches start.

use crate::constants::defaults;
use crate::source::FailoverError;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOutSettings {
    pub batch_size: usize,
    pub concurrency: usize,
    pub inter_batch_delay: Duration,
}

impl Default for FanOutSettings {
    fn default() -> Self {
        Self {
            batch_size: defaults::FAN_OUT_BATCH_SIZE,
            concurrency: defaults::FAN_OUT_CONCURRENCY,
            inter_batch_delay: Duration::from_millis(defaults::FAN_OUT_INTER_BATCH_DELAY_MS),
        }
    }
}

impl FanOutSettings {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Error type of a per-id fetch
pub trait FanOutFailure: Display {
    /// Whether this failure should stop the whole fan-out instead of
    /// degrading to an empty result for one id
    fn aborts_fan_out(&self) -> bool {
        false
    }
}

impl FanOutFailure for FailoverError {
    fn aborts_fan_out(&self) -> bool {
        self.is_shutdown()
    }
}

/// Per-id results of one fan-out call
#[derive(Debug, Clone)]
pub struct FanOutReport<K, T> {
    pub results: HashMap<K, Vec<T>>,
    pub failed_ids: Vec<K>,
    pub batches: usize,
}

impl<K, T> FanOutReport<K, T> {
    pub fn record_count(&self) -> usize {
        self.results.values().map(Vec::len).sum()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed_ids.is_empty()
    }

    /// Every id was attempted and none of them succeeded
    pub fn all_failed(&self) -> bool {
        !self.results.is_empty() && self.failed_ids.len() == self.results.len()
    }

    /// Flatten every id's records into one list
    pub fn into_records(self) -> Vec<T> {
        self.results.into_values().flatten().collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FanOutProcessor {
    settings: FanOutSettings,
}

impl FanOutProcessor {
    pub fn new(settings: FanOutSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &FanOutSettings {
        &self.settings
    }

    /// Call `fetch` once per distinct id and gather the results by id.
    ///
    /// Returns the first aborting failure instead of a report when one occurs.
    pub async fn process<K, T, E, F, Fut>(
        &self,
        label: &str,
        ids: Vec<K>,
        fetch: F,
    ) -> Result<FanOutReport<K, T>, E>
    where
        K: Clone + Eq + Hash + Display,
        E: FanOutFailure,
        F: Fn(K) -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
    {
        let mut seen = HashSet::with_capacity(ids.len());
        let ids: Vec<K> = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();

        let batch_size = self.settings.batch_size.max(1);
        let total_batches = ids.len().div_ceil(batch_size);
        let started = Instant::now();
        let mut report = FanOutReport {
            results: HashMap::with_capacity(ids.len()),
            failed_ids: Vec::new(),
            batches: 0,
        };

        info!(
            operation = label,
            ids = ids.len(),
            batches = total_batches,
            batch_size = batch_size,
            concurrency = self.settings.concurrency,
            "🌐 Starting fan-out"
        );

        for (batch_index, batch) in ids.chunks(batch_size).enumerate() {
            let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
            let fetch = &fetch;
            let work = batch.iter().cloned().map(|id| {
                let semaphore = Arc::clone(&semaphore);
                async move {
                    // The semaphore is never closed
                    let _permit = semaphore.acquire().await.ok();
                    let outcome = fetch(id.clone()).await;
                    (id, outcome)
                }
            });

            let mut aborted = None;
            for (id, outcome) in join_all(work).await {
                match outcome {
                    Ok(records) => {
                        report.results.insert(id, records);
                    }
                    Err(e) if e.aborts_fan_out() => {
                        if aborted.is_none() {
                            aborted = Some(e);
                        }
                    }
                    Err(e) => {
                        warn!(operation = label, id = %id, error = %e, "⚠️ Fan-out item failed, using empty result");
                        report.results.insert(id.clone(), Vec::new());
                        report.failed_ids.push(id);
                    }
                }
            }
            report.batches += 1;

            if let Some(e) = aborted {
                warn!(
                    operation = label,
                    batch = batch_index + 1,
                    of = total_batches,
                    error = %e,
                    "🛑 Fan-out aborted"
                );
                return Err(e);
            }

            debug!(
                operation = label,
                batch = batch_index + 1,
                of = total_batches,
                size = batch.len(),
                "Fan-out batch complete"
            );

            if batch_index + 1 < total_batches && !self.settings.inter_batch_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_batch_delay).await;
            }
        }

        info!(
            operation = label,
            batches = report.batches,
            records = report.record_count(),
            failed = report.failed_ids.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "✅ Fan-out complete"
        );
        Ok(report)
    }
}
