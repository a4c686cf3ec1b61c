use super::source_function_sql;
use crate::constants::tables;
use crate::database::SqlValue;
use crate::source::{FetchRequest, MappingError, SourceRow};
use crate::sync::{content_hash, BatchUpsertSpec, DedupePolicy, UpsertRecord};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A treasury withdrawal requested by a governance action.
///
/// One action may pay the same stake address several different amounts, so
/// the amount is folded into the key as `amount_hash`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreasuryWithdrawal {
    pub proposal_id: String,
    pub proposal_tx_hash: Option<String>,
    pub stake_address: String,
    pub amount: BigDecimal,
    pub amount_hash: String,
    pub block_time: Option<DateTime<Utc>>,
    pub ratified_epoch: Option<i64>,
    pub enacted_epoch: Option<i64>,
}

static TREASURY_WITHDRAWALS_SPEC: BatchUpsertSpec = BatchUpsertSpec {
    table: tables::TREASURY_WITHDRAWALS,
    columns: &[
        "proposal_id",
        "proposal_tx_hash",
        "stake_address",
        "amount",
        "amount_hash",
        "block_time",
        "ratified_epoch",
        "enacted_epoch",
    ],
    conflict_keys: &["proposal_id", "stake_address", "amount_hash"],
    updateable: &[
        "proposal_tx_hash",
        "amount",
        "block_time",
        "ratified_epoch",
        "enacted_epoch",
    ],
    dedupe: DedupePolicy::KeepFirst,
};

impl TreasuryWithdrawal {
    pub const FUNCTION: &'static str = "get_treasury_withdrawals";

    pub fn from_row(row: &SourceRow) -> Result<Self, MappingError> {
        let amount = row.numeric("amount")?;
        Ok(Self {
            proposal_id: row.text("proposal_id")?,
            proposal_tx_hash: row.opt_text("proposal_tx_hash")?,
            stake_address: row.text("stake_address")?,
            amount_hash: Self::hash_amount(&amount),
            amount,
            block_time: row.opt_timestamp("block_time")?,
            ratified_epoch: row.opt_i64("ratified_epoch")?,
            enacted_epoch: row.opt_i64("enacted_epoch")?,
        })
    }

    /// Hash of the normalized amount, so `1000` and `1000.00` collide
    pub fn hash_amount(amount: &BigDecimal) -> String {
        content_hash(&amount.normalized().to_string())
    }

    pub fn fetch_request(schema: &str) -> FetchRequest<Self> {
        FetchRequest::new(Self::FUNCTION, source_function_sql(schema, Self::FUNCTION, 0), Self::from_row)
    }
}

impl UpsertRecord for TreasuryWithdrawal {
    fn spec() -> &'static BatchUpsertSpec {
        &TREASURY_WITHDRAWALS_SPEC
    }

    fn to_row(&self) -> Vec<SqlValue> {
        vec![
            self.proposal_id.clone().into(),
            self.proposal_tx_hash.clone().into(),
            self.stake_address.clone().into(),
            self.amount.clone().into(),
            self.amount_hash.clone().into(),
            self.block_time.into(),
            self.ratified_epoch.into(),
            self.enacted_epoch.into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::dedupe;
    use std::str::FromStr;

    fn row(amount: &str) -> SourceRow {
        SourceRow::new()
            .with("proposal_id", "gov_action1w")
            .with("proposal_tx_hash", "cc")
            .with("stake_address", "stake1u9")
            .with("amount", BigDecimal::from_str(amount).unwrap())
            .with("block_time", SqlValue::Timestamp(None))
            .with("ratified_epoch", 500_i64)
            .with("enacted_epoch", SqlValue::Int(None))
    }

    #[test]
    fn test_different_amounts_to_same_address_are_distinct() {
        let records = vec![
            TreasuryWithdrawal::from_row(&row("1000")).unwrap(),
            TreasuryWithdrawal::from_row(&row("2500")).unwrap(),
            TreasuryWithdrawal::from_row(&row("1000.00")).unwrap(),
        ];
        let unique = dedupe(records);
        assert_eq!(unique.len(), 2);
        assert_ne!(unique[0].amount_hash, unique[1].amount_hash);
    }

    #[test]
    fn test_amount_may_arrive_as_text() {
        let row = row("1").with("amount", "42000000");
        let record = TreasuryWithdrawal::from_row(&row).unwrap();
        assert_eq!(record.amount, BigDecimal::from(42_000_000));
    }
}
