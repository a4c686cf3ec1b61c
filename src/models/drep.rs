use super::source_function_sql;
use crate::constants::tables;
use crate::database::SqlValue;
use crate::source::{FetchRequest, MappingError, SourceRow};
use crate::sync::{BatchUpsertSpec, DedupePolicy, UpsertRecord};
use bigdecimal::BigDecimal;
use serde::Serialize;

/// A registered delegated representative
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrepRecord {
    pub drep_id: String,
    pub hex: Option<String>,
    pub has_script: Option<bool>,
    pub registered: Option<bool>,
    pub active: Option<bool>,
    pub deposit: Option<BigDecimal>,
    pub amount: Option<BigDecimal>,
    pub expires_epoch_no: Option<i64>,
    pub meta_url: Option<String>,
    pub meta_hash: Option<String>,
}

static DREPS_SPEC: BatchUpsertSpec = BatchUpsertSpec {
    table: tables::DREPS,
    columns: &[
        "drep_id",
        "hex",
        "has_script",
        "registered",
        "active",
        "deposit",
        "amount",
        "expires_epoch_no",
        "meta_url",
        "meta_hash",
    ],
    conflict_keys: &["drep_id"],
    updateable: &[
        "hex",
        "has_script",
        "registered",
        "active",
        "deposit",
        "amount",
        "expires_epoch_no",
        "meta_url",
        "meta_hash",
    ],
    dedupe: DedupePolicy::KeepFirst,
};

impl DrepRecord {
    pub const FUNCTION: &'static str = "get_drep_list";

    pub fn from_row(row: &SourceRow) -> Result<Self, MappingError> {
        Ok(Self {
            drep_id: row.text("drep_id")?,
            hex: row.opt_text("hex")?,
            has_script: row.opt_bool("has_script")?,
            registered: row.opt_bool("registered")?,
            active: row.opt_bool("active")?,
            deposit: row.opt_numeric("deposit")?,
            amount: row.opt_numeric("amount")?,
            expires_epoch_no: row.opt_i64("expires_epoch_no")?,
            meta_url: row.opt_text("meta_url")?,
            meta_hash: row.opt_text("meta_hash")?,
        })
    }

    pub fn fetch_request(schema: &str) -> FetchRequest<Self> {
        FetchRequest::new(Self::FUNCTION, source_function_sql(schema, Self::FUNCTION, 0), Self::from_row)
    }
}

impl UpsertRecord for DrepRecord {
    fn spec() -> &'static BatchUpsertSpec {
        &DREPS_SPEC
    }

    fn to_row(&self) -> Vec<SqlValue> {
        vec![
            self.drep_id.clone().into(),
            self.hex.clone().into(),
            self.has_script.into(),
            self.registered.into(),
            self.active.into(),
            self.deposit.clone().into(),
            self.amount.clone().into(),
            self.expires_epoch_no.into(),
            self.meta_url.clone().into(),
            self.meta_hash.clone().into(),
        ]
    }
}
