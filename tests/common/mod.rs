//! Shared fixtures for integration tests: a scripted replica connector and
//! row builders shaped like the governance source functions.

#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{TimeZone, Utc};
use govsync_core::destination::InMemoryDestination;
use govsync_core::engine::{EngineSettings, SyncEngine};
use govsync_core::source::{
    QueryParam, Source, SourceConnector, SourceError, SourceRegistry, SourceRow, SourceStatement,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-process stand-in for a set of read replicas.
///
/// Statements are matched to a dataset by the source function they call
/// (`<schema>.<function>(`). Keyed statements look up rows by their first text
/// parameter.
#[derive(Default)]
pub struct FakeReplicas {
    bulk: Mutex<HashMap<String, Vec<SourceRow>>>,
    keyed: Mutex<HashMap<(String, String), Vec<SourceRow>>>,
    down: Mutex<HashSet<String>>,
    failing_ids: Mutex<HashSet<String>>,
    latency: Duration,
    calls: Mutex<Vec<(String, String)>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeReplicas {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            ..Self::default()
        })
    }

    pub fn serve(&self, function: &str, rows: Vec<SourceRow>) {
        self.bulk.lock().insert(function.to_string(), rows);
    }

    pub fn serve_keyed(&self, function: &str, id: &str, rows: Vec<SourceRow>) {
        self.keyed
            .lock()
            .insert((function.to_string(), id.to_string()), rows);
    }

    pub fn take_down(&self, source: &str) {
        self.down.lock().insert(source.to_string());
    }

    pub fn bring_up(&self, source: &str) {
        self.down.lock().remove(source);
    }

    /// Every source rejects keyed statements for `id`
    pub fn fail_id(&self, id: &str) {
        self.failing_ids.lock().insert(id.to_string());
    }

    /// `(source, function)` for every statement received
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, source: &str) -> usize {
        self.calls.lock().iter().filter(|(s, _)| s == source).count()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn function_of(&self, sql: &str) -> String {
        let bulk = self.bulk.lock();
        let keyed = self.keyed.lock();
        bulk.keys()
            .chain(keyed.keys().map(|(function, _)| function))
            .find(|function| sql.contains(&format!(".{function}(")))
            .cloned()
            .unwrap_or_default()
    }

    fn refused(source: &Source) -> SourceError {
        SourceError::Connection {
            source_name: source.name.clone(),
            message: "connection refused".to_string(),
        }
    }
}

#[async_trait]
impl SourceConnector for FakeReplicas {
    async fn fetch_rows(
        &self,
        source: &Source,
        statement: &SourceStatement,
    ) -> Result<Vec<SourceRow>, SourceError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let function = self.function_of(&statement.sql);
        self.calls
            .lock()
            .push((source.name.clone(), function.clone()));

        if self.down.lock().contains(&source.name) {
            return Err(Self::refused(source));
        }

        if let Some(QueryParam::Text(id)) = statement.params.first() {
            if self.failing_ids.lock().contains(id) {
                return Err(SourceError::Query {
                    source_name: source.name.clone(),
                    code: Some("42883".to_string()),
                    message: format!("no data for {id}"),
                });
            }
            return Ok(self
                .keyed
                .lock()
                .get(&(function, id.clone()))
                .cloned()
                .unwrap_or_default());
        }

        Ok(self.bulk.lock().get(&function).cloned().unwrap_or_default())
    }

    async fn ping(&self, source: &Source) -> Result<(), SourceError> {
        if self.down.lock().contains(&source.name) {
            return Err(Self::refused(source));
        }
        Ok(())
    }
}

pub fn sources(names: &[&str]) -> SourceRegistry {
    let sources = names
        .iter()
        .enumerate()
        .map(|(rank, name)| Source::with_url(*name, format!("postgres://sync:pw@{name}/dbsync"), rank as u32))
        .collect();
    SourceRegistry::new(sources, &[])
}

/// Fast settings: one retry, no pauses between sources or batches
pub fn fast_settings() -> EngineSettings {
    EngineSettings::builder()
        .retry(2, Duration::from_millis(10))
        .timeouts(Duration::from_secs(1), Duration::from_secs(5))
        .failover(true, Duration::ZERO)
        .circuit_breaker(3, Duration::from_secs(300))
        .max_concurrent_operations(4)
        .fan_out(3, Duration::ZERO)
        .upsert_chunk_size(2)
        .build()
}

pub struct Harness {
    pub replicas: Arc<FakeReplicas>,
    pub destination: Arc<InMemoryDestination>,
    pub engine: Arc<SyncEngine>,
}

pub fn harness(source_names: &[&str], settings: EngineSettings, replicas: Arc<FakeReplicas>) -> Harness {
    let destination = Arc::new(InMemoryDestination::new());
    let engine = Arc::new(SyncEngine::new(
        settings,
        sources(source_names),
        replicas.clone(),
        destination.clone(),
    ));
    Harness {
        replicas,
        destination,
        engine,
    }
}

pub fn lovelace(amount: &str) -> BigDecimal {
    BigDecimal::from_str(amount).unwrap()
}

pub fn totals_row(epoch_no: i64, treasury: &str) -> SourceRow {
    SourceRow::new()
        .with("epoch_no", epoch_no)
        .with("circulation", lovelace("35000000000000000"))
        .with("treasury", lovelace(treasury))
        .with("reward", lovelace("1200000000000"))
        .with("supply", lovelace("37000000000000000"))
        .with("reserves", lovelace("7000000000000000"))
        .with("fees", lovelace("52000000000"))
        .with("deposits_stake", lovelace("2000000"))
        .with("deposits_drep", lovelace("500000000"))
        .with("deposits_proposal", lovelace("100000000000"))
}

pub fn proposal_row(proposal_id: &str, index: i64) -> SourceRow {
    SourceRow::new()
        .with("block_time", Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap())
        .with("proposal_id", proposal_id)
        .with("proposal_tx_hash", format!("tx_{proposal_id}"))
        .with("proposal_index", index)
        .with("proposal_type", "InfoAction")
        .with("proposal_description", json!({"tag": "InfoAction"}))
        .with("deposit", lovelace("100000000000"))
        .with("return_address", "stake1uxreturn")
        .with("proposed_epoch", 540_i64)
        .with("ratified_epoch", None::<i64>)
        .with("enacted_epoch", None::<i64>)
        .with("dropped_epoch", None::<i64>)
        .with("expired_epoch", None::<i64>)
        .with("expiration", 546_i64)
        .with("meta_url", "https://example.org/meta.json")
        .with("meta_hash", "abcd")
        .with("withdrawal", None::<serde_json::Value>)
}

pub fn proposal_vote_row(voter_id: &str, vote: &str) -> SourceRow {
    SourceRow::new()
        .with("voter_id", voter_id)
        .with("voter_role", "DRep")
        .with("voter_hex", None::<String>)
        .with("voter_has_script", false)
        .with("vote", vote)
        .with("vote_tx_hash", format!("vtx_{voter_id}"))
        .with("block_time", Utc.with_ymd_and_hms(2025, 3, 2, 8, 30, 0).unwrap())
        .with("meta_url", None::<String>)
        .with("meta_hash", None::<String>)
}

pub fn voting_summary_row(epoch_no: i64, drep_yes: i64) -> SourceRow {
    SourceRow::new()
        .with("epoch_no", epoch_no)
        .with("proposal_type", "InfoAction")
        .with("drep_yes_votes_cast", drep_yes)
        .with("drep_yes_vote_power", lovelace("1000000"))
        .with("drep_yes_pct", 61.5)
        .with("drep_no_votes_cast", 3_i64)
        .with("drep_no_vote_power", lovelace("625000"))
        .with("drep_no_pct", 38.5)
        .with("drep_abstain_votes_cast", 1_i64)
        .with("pool_yes_votes_cast", None::<i64>)
        .with("pool_yes_vote_power", None::<BigDecimal>)
        .with("pool_yes_pct", None::<f64>)
        .with("pool_no_votes_cast", None::<i64>)
        .with("pool_no_vote_power", None::<BigDecimal>)
        .with("pool_no_pct", None::<f64>)
        .with("pool_abstain_votes_cast", None::<i64>)
        .with("committee_yes_votes_cast", 5_i64)
        .with("committee_yes_pct", 100.0)
        .with("committee_no_votes_cast", 0_i64)
        .with("committee_no_pct", 0.0)
        .with("committee_abstain_votes_cast", 0_i64)
}

pub fn committee_info_row(proposal_id: &str, members: &[&str]) -> SourceRow {
    let members: Vec<serde_json::Value> = members
        .iter()
        .map(|id| json!({"cc_hot_id": id, "status": "authorized"}))
        .collect();
    SourceRow::new()
        .with("proposal_id", proposal_id)
        .with("proposal_tx_hash", format!("tx_{proposal_id}"))
        .with("proposal_index", 0_i64)
        .with("quorum_numerator", 2_i64)
        .with("quorum_denominator", 3_i64)
        .with("members", serde_json::Value::Array(members))
}

pub fn committee_vote_row(proposal_id: &str, vote_tx_hash: &str, vote: &str) -> SourceRow {
    SourceRow::new()
        .with("proposal_id", proposal_id)
        .with("proposal_tx_hash", format!("tx_{proposal_id}"))
        .with("proposal_index", 0_i64)
        .with("vote_tx_hash", vote_tx_hash)
        .with("block_time", Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap())
        .with("vote", vote)
        .with("meta_url", None::<String>)
        .with("meta_hash", None::<String>)
}

pub fn drep_row(drep_id: &str) -> SourceRow {
    SourceRow::new()
        .with("drep_id", drep_id)
        .with("hex", format!("hex_{drep_id}"))
        .with("has_script", false)
        .with("registered", true)
        .with("active", true)
        .with("deposit", lovelace("500000000"))
        .with("amount", lovelace("1234567"))
        .with("expires_epoch_no", 560_i64)
        .with("meta_url", None::<String>)
        .with("meta_hash", None::<String>)
}

pub fn treasury_row(proposal_id: &str, stake_address: &str, amount: &str) -> SourceRow {
    SourceRow::new()
        .with("proposal_id", proposal_id)
        .with("proposal_tx_hash", format!("tx_{proposal_id}"))
        .with("stake_address", stake_address)
        .with("amount", lovelace(amount))
        .with("block_time", Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap())
        .with("ratified_epoch", 530_i64)
        .with("enacted_epoch", 531_i64)
}
