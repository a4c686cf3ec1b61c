use super::source_function_sql;
use crate::constants::tables;
use crate::database::SqlValue;
use crate::source::{FetchRequest, MappingError, SourceRow};
use crate::sync::{BatchUpsertSpec, DedupePolicy, UpsertRecord};
use bigdecimal::BigDecimal;
use serde::Serialize;

/// Per-epoch protocol totals, all amounts in lovelace.
///
/// Source columns: `epoch_no, circulation, treasury, reward, supply, reserves,
/// fees, deposits_stake, deposits_drep, deposits_proposal`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TotalsRow {
    pub epoch_no: i64,
    pub circulation: Option<BigDecimal>,
    pub treasury: Option<BigDecimal>,
    pub reward: Option<BigDecimal>,
    pub supply: Option<BigDecimal>,
    pub reserves: Option<BigDecimal>,
    pub fees: Option<BigDecimal>,
    pub deposits_stake: Option<BigDecimal>,
    pub deposits_drep: Option<BigDecimal>,
    pub deposits_proposal: Option<BigDecimal>,
}

// A repeated epoch takes the values of its last occurrence
static TOTALS_SPEC: BatchUpsertSpec = BatchUpsertSpec {
    table: tables::TOTALS,
    columns: &[
        "epoch_no",
        "circulation",
        "treasury",
        "reward",
        "supply",
        "reserves",
        "fees",
        "deposits_stake",
        "deposits_drep",
        "deposits_proposal",
    ],
    conflict_keys: &["epoch_no"],
    updateable: &[
        "circulation",
        "treasury",
        "reward",
        "supply",
        "reserves",
        "fees",
        "deposits_stake",
        "deposits_drep",
        "deposits_proposal",
    ],
    dedupe: DedupePolicy::MergeOnConflict,
};

impl TotalsRow {
    pub const FUNCTION: &'static str = "get_totals";

    pub fn from_row(row: &SourceRow) -> Result<Self, MappingError> {
        Ok(Self {
            epoch_no: row.i64("epoch_no")?,
            circulation: row.opt_numeric("circulation")?,
            treasury: row.opt_numeric("treasury")?,
            reward: row.opt_numeric("reward")?,
            supply: row.opt_numeric("supply")?,
            reserves: row.opt_numeric("reserves")?,
            fees: row.opt_numeric("fees")?,
            deposits_stake: row.opt_numeric("deposits_stake")?,
            deposits_drep: row.opt_numeric("deposits_drep")?,
            deposits_proposal: row.opt_numeric("deposits_proposal")?,
        })
    }

    pub fn fetch_request(schema: &str) -> FetchRequest<Self> {
        FetchRequest::new(Self::FUNCTION, source_function_sql(schema, Self::FUNCTION, 0), Self::from_row)
    }
}

impl UpsertRecord for TotalsRow {
    fn spec() -> &'static BatchUpsertSpec {
        &TOTALS_SPEC
    }

    fn to_row(&self) -> Vec<SqlValue> {
        vec![
            self.epoch_no.into(),
            self.circulation.clone().into(),
            self.treasury.clone().into(),
            self.reward.clone().into(),
            self.supply.clone().into(),
            self.reserves.clone().into(),
            self.fees.clone().into(),
            self.deposits_stake.clone().into(),
            self.deposits_drep.clone().into(),
            self.deposits_proposal.clone().into(),
        ]
    }
}
