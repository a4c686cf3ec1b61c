use super::source_function_sql;
use crate::constants::tables;
use crate::database::SqlValue;
use crate::source::{FetchRequest, MappingError, SourceRow};
use crate::sync::{content_hash, BatchUpsertSpec, DedupePolicy, UpsertRecord};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// A governance action and its lifecycle epochs.
///
/// The source lists treasury withdrawal actions once per withdrawal, so the
/// withdrawal payload is hashed into `withdrawal_hash` and made part of the key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Proposal {
    pub block_time: DateTime<Utc>,
    pub proposal_id: String,
    pub proposal_tx_hash: String,
    pub proposal_index: i64,
    pub proposal_type: String,
    pub proposal_description: Option<JsonValue>,
    pub deposit: Option<BigDecimal>,
    pub return_address: Option<String>,
    pub proposed_epoch: Option<i64>,
    pub ratified_epoch: Option<i64>,
    pub enacted_epoch: Option<i64>,
    pub dropped_epoch: Option<i64>,
    pub expired_epoch: Option<i64>,
    pub expiration: Option<i64>,
    pub meta_url: Option<String>,
    pub meta_hash: Option<String>,
    pub withdrawal: Option<JsonValue>,
    pub withdrawal_hash: String,
}

static PROPOSALS_SPEC: BatchUpsertSpec = BatchUpsertSpec {
    table: tables::PROPOSALS,
    columns: &[
        "block_time",
        "proposal_id",
        "proposal_tx_hash",
        "proposal_index",
        "proposal_type",
        "proposal_description",
        "deposit",
        "return_address",
        "proposed_epoch",
        "ratified_epoch",
        "enacted_epoch",
        "dropped_epoch",
        "expired_epoch",
        "expiration",
        "meta_url",
        "meta_hash",
        "withdrawal",
        "withdrawal_hash",
    ],
    conflict_keys: &["block_time", "proposal_id", "proposal_tx_hash", "withdrawal_hash"],
    updateable: &[
        "proposal_index",
        "proposal_type",
        "proposal_description",
        "deposit",
        "return_address",
        "proposed_epoch",
        "ratified_epoch",
        "enacted_epoch",
        "dropped_epoch",
        "expired_epoch",
        "expiration",
        "meta_url",
        "meta_hash",
        "withdrawal",
    ],
    dedupe: DedupePolicy::KeepFirst,
};

impl Proposal {
    pub const FUNCTION: &'static str = "get_proposal_list";

    pub fn from_row(row: &SourceRow) -> Result<Self, MappingError> {
        let withdrawal = row.opt_json("withdrawal")?;
        Ok(Self {
            block_time: row.timestamp("block_time")?,
            proposal_id: row.text("proposal_id")?,
            proposal_tx_hash: row.text("proposal_tx_hash")?,
            proposal_index: row.i64("proposal_index")?,
            proposal_type: row.text("proposal_type")?,
            proposal_description: row.opt_json("proposal_description")?,
            deposit: row.opt_numeric("deposit")?,
            return_address: row.opt_text("return_address")?,
            proposed_epoch: row.opt_i64("proposed_epoch")?,
            ratified_epoch: row.opt_i64("ratified_epoch")?,
            enacted_epoch: row.opt_i64("enacted_epoch")?,
            dropped_epoch: row.opt_i64("dropped_epoch")?,
            expired_epoch: row.opt_i64("expired_epoch")?,
            expiration: row.opt_i64("expiration")?,
            meta_url: row.opt_text("meta_url")?,
            meta_hash: row.opt_text("meta_hash")?,
            withdrawal_hash: Self::hash_withdrawal(withdrawal.as_ref()),
            withdrawal,
        })
    }

    /// Hash of the serialized withdrawal; actions without one share the hash of `""`
    pub fn hash_withdrawal(withdrawal: Option<&JsonValue>) -> String {
        match withdrawal {
            Some(JsonValue::Null) | None => content_hash(""),
            Some(payload) => content_hash(&payload.to_string()),
        }
    }

    pub fn fetch_request(schema: &str) -> FetchRequest<Self> {
        FetchRequest::new(Self::FUNCTION, source_function_sql(schema, Self::FUNCTION, 0), Self::from_row)
    }
}

/// Distinct proposal ids, the key set for per-proposal fan-out
pub fn proposal_ids_request(schema: &str) -> FetchRequest<String> {
    FetchRequest::new(
        "proposal_ids",
        format!(
            "SELECT DISTINCT proposal_id FROM {schema}.{}() WHERE proposal_id IS NOT NULL ORDER BY proposal_id",
            Proposal::FUNCTION
        ),
        |row| row.text("proposal_id"),
    )
}

impl UpsertRecord for Proposal {
    fn spec() -> &'static BatchUpsertSpec {
        &PROPOSALS_SPEC
    }

    fn to_row(&self) -> Vec<SqlValue> {
        vec![
            self.block_time.into(),
            self.proposal_id.clone().into(),
            self.proposal_tx_hash.clone().into(),
            self.proposal_index.into(),
            self.proposal_type.clone().into(),
            self.proposal_description.clone().into(),
            self.deposit.clone().into(),
            self.return_address.clone().into(),
            self.proposed_epoch.into(),
            self.ratified_epoch.into(),
            self.enacted_epoch.into(),
            self.dropped_epoch.into(),
            self.expired_epoch.into(),
            self.expiration.into(),
            self.meta_url.clone().into(),
            self.meta_hash.clone().into(),
            self.withdrawal.clone().into(),
            self.withdrawal_hash.clone().into(),
        ]
    }
}
