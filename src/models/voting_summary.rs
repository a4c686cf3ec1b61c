use super::source_function_sql;
use crate::constants::tables;
use crate::database::SqlValue;
use crate::source::{FetchRequest, MappingError, SourceRow};
use crate::sync::{BatchUpsertSpec, DedupePolicy, UpsertRecord};
use bigdecimal::BigDecimal;
use serde::Serialize;

/// Vote tallies and voting power per role for one proposal at one epoch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VotingSummary {
    pub proposal_id: String,
    pub epoch_no: i64,
    pub proposal_type: Option<String>,
    pub drep_yes_votes_cast: Option<i64>,
    pub drep_yes_vote_power: Option<BigDecimal>,
    pub drep_yes_pct: Option<f64>,
    pub drep_no_votes_cast: Option<i64>,
    pub drep_no_vote_power: Option<BigDecimal>,
    pub drep_no_pct: Option<f64>,
    pub drep_abstain_votes_cast: Option<i64>,
    pub pool_yes_votes_cast: Option<i64>,
    pub pool_yes_vote_power: Option<BigDecimal>,
    pub pool_yes_pct: Option<f64>,
    pub pool_no_votes_cast: Option<i64>,
    pub pool_no_vote_power: Option<BigDecimal>,
    pub pool_no_pct: Option<f64>,
    pub pool_abstain_votes_cast: Option<i64>,
    pub committee_yes_votes_cast: Option<i64>,
    pub committee_yes_pct: Option<f64>,
    pub committee_no_votes_cast: Option<i64>,
    pub committee_no_pct: Option<f64>,
    pub committee_abstain_votes_cast: Option<i64>,
}

static VOTING_SUMMARY_SPEC: BatchUpsertSpec = BatchUpsertSpec {
    table: tables::PROPOSAL_VOTING_SUMMARY,
    columns: &[
        "proposal_id",
        "epoch_no",
        "proposal_type",
        "drep_yes_votes_cast",
        "drep_yes_vote_power",
        "drep_yes_pct",
        "drep_no_votes_cast",
        "drep_no_vote_power",
        "drep_no_pct",
        "drep_abstain_votes_cast",
        "pool_yes_votes_cast",
        "pool_yes_vote_power",
        "pool_yes_pct",
        "pool_no_votes_cast",
        "pool_no_vote_power",
        "pool_no_pct",
        "pool_abstain_votes_cast",
        "committee_yes_votes_cast",
        "committee_yes_pct",
        "committee_no_votes_cast",
        "committee_no_pct",
        "committee_abstain_votes_cast",
    ],
    conflict_keys: &["proposal_id", "epoch_no"],
    updateable: &[
        "proposal_type",
        "drep_yes_votes_cast",
        "drep_yes_vote_power",
        "drep_yes_pct",
        "drep_no_votes_cast",
        "drep_no_vote_power",
        "drep_no_pct",
        "drep_abstain_votes_cast",
        "pool_yes_votes_cast",
        "pool_yes_vote_power",
        "pool_yes_pct",
        "pool_no_votes_cast",
        "pool_no_vote_power",
        "pool_no_pct",
        "pool_abstain_votes_cast",
        "committee_yes_votes_cast",
        "committee_yes_pct",
        "committee_no_votes_cast",
        "committee_no_pct",
        "committee_abstain_votes_cast",
    ],
    dedupe: DedupePolicy::KeepFirst,
};

impl VotingSummary {
    pub const FUNCTION: &'static str = "get_proposal_voting_summary";

    pub fn from_row(row: &SourceRow, proposal_id: &str) -> Result<Self, MappingError> {
        let proposal_id = match row.get("proposal_id") {
            Some(_) => row.opt_text("proposal_id")?.unwrap_or_else(|| proposal_id.to_string()),
            None => proposal_id.to_string(),
        };
        Ok(Self {
            proposal_id,
            epoch_no: row.i64("epoch_no")?,
            proposal_type: row.opt_text("proposal_type")?,
            drep_yes_votes_cast: row.opt_i64("drep_yes_votes_cast")?,
            drep_yes_vote_power: row.opt_numeric("drep_yes_vote_power")?,
            drep_yes_pct: row.opt_f64("drep_yes_pct")?,
            drep_no_votes_cast: row.opt_i64("drep_no_votes_cast")?,
            drep_no_vote_power: row.opt_numeric("drep_no_vote_power")?,
            drep_no_pct: row.opt_f64("drep_no_pct")?,
            drep_abstain_votes_cast: row.opt_i64("drep_abstain_votes_cast")?,
            pool_yes_votes_cast: row.opt_i64("pool_yes_votes_cast")?,
            pool_yes_vote_power: row.opt_numeric("pool_yes_vote_power")?,
            pool_yes_pct: row.opt_f64("pool_yes_pct")?,
            pool_no_votes_cast: row.opt_i64("pool_no_votes_cast")?,
            pool_no_vote_power: row.opt_numeric("pool_no_vote_power")?,
            pool_no_pct: row.opt_f64("pool_no_pct")?,
            pool_abstain_votes_cast: row.opt_i64("pool_abstain_votes_cast")?,
            committee_yes_votes_cast: row.opt_i64("committee_yes_votes_cast")?,
            committee_yes_pct: row.opt_f64("committee_yes_pct")?,
            committee_no_votes_cast: row.opt_i64("committee_no_votes_cast")?,
            committee_no_pct: row.opt_f64("committee_no_pct")?,
            committee_abstain_votes_cast: row.opt_i64("committee_abstain_votes_cast")?,
        })
    }

    pub fn fetch_request(schema: &str, proposal_id: &str) -> FetchRequest<Self> {
        let proposal = proposal_id.to_string();
        FetchRequest::new(
            Self::FUNCTION,
            source_function_sql(schema, Self::FUNCTION, 1),
            move |row| Self::from_row(row, &proposal),
        )
        .bind(proposal_id)
    }
}

impl UpsertRecord for VotingSummary {
    fn spec() -> &'static BatchUpsertSpec {
        &VOTING_SUMMARY_SPEC
    }

    fn to_row(&self) -> Vec<SqlValue> {
        vec![
            self.proposal_id.clone().into(),
            self.epoch_no.into(),
            self.proposal_type.clone().into(),
            self.drep_yes_votes_cast.into(),
            self.drep_yes_vote_power.clone().into(),
            self.drep_yes_pct.into(),
            self.drep_no_votes_cast.into(),
            self.drep_no_vote_power.clone().into(),
            self.drep_no_pct.into(),
            self.drep_abstain_votes_cast.into(),
            self.pool_yes_votes_cast.into(),
            self.pool_yes_vote_power.clone().into(),
            self.pool_yes_pct.into(),
            self.pool_no_votes_cast.into(),
            self.pool_no_vote_power.clone().into(),
            self.pool_no_pct.into(),
            self.pool_abstain_votes_cast.into(),
            self.committee_yes_votes_cast.into(),
            self.committee_yes_pct.into(),
            self.committee_no_votes_cast.into(),
            self.committee_no_pct.into(),
            self.committee_abstain_votes_cast.into(),
        ]
    }
}
