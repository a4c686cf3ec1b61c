use super::source_function_sql;
use crate::constants::tables;
use crate::database::SqlValue;
use crate::source::{FetchRequest, MappingError, SourceRow};
use crate::sync::{BatchUpsertSpec, DedupePolicy, UpsertRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A DRep, stake pool or committee vote on one governance action.
///
/// A voter may re-vote; the source returns newest first, so the first row
/// per `(proposal_id, voter_id, voter_role)` is the effective vote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProposalVote {
    pub proposal_id: String,
    pub voter_id: String,
    pub voter_role: String,
    pub voter_hex: Option<String>,
    pub voter_has_script: Option<bool>,
    pub vote: String,
    pub vote_tx_hash: Option<String>,
    pub block_time: Option<DateTime<Utc>>,
    pub meta_url: Option<String>,
    pub meta_hash: Option<String>,
}

static PROPOSAL_VOTES_SPEC: BatchUpsertSpec = BatchUpsertSpec {
    table: tables::PROPOSAL_VOTES,
    columns: &[
        "proposal_id",
        "voter_id",
        "voter_role",
        "voter_hex",
        "voter_has_script",
        "vote",
        "vote_tx_hash",
        "block_time",
        "meta_url",
        "meta_hash",
    ],
    conflict_keys: &["proposal_id", "voter_id", "voter_role"],
    updateable: &[
        "voter_hex",
        "voter_has_script",
        "vote",
        "vote_tx_hash",
        "block_time",
        "meta_url",
        "meta_hash",
    ],
    dedupe: DedupePolicy::KeepFirst,
};

impl ProposalVote {
    pub const FUNCTION: &'static str = "get_proposal_votes";

    pub fn from_row(row: &SourceRow, proposal_id: &str) -> Result<Self, MappingError> {
        let proposal_id = match row.get("proposal_id") {
            Some(_) => row.opt_text("proposal_id")?.unwrap_or_else(|| proposal_id.to_string()),
            None => proposal_id.to_string(),
        };
        Ok(Self {
            proposal_id,
            voter_id: row.text("voter_id")?,
            voter_role: row.text("voter_role")?,
            voter_hex: row.opt_text("voter_hex")?,
            voter_has_script: row.opt_bool("voter_has_script")?,
            vote: row.text("vote")?,
            vote_tx_hash: row.opt_text("vote_tx_hash")?,
            block_time: row.opt_timestamp("block_time")?,
            meta_url: row.opt_text("meta_url")?,
            meta_hash: row.opt_text("meta_hash")?,
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

impl UpsertRecord for ProposalVote {
    fn spec() -> &'static BatchUpsertSpec {
        &PROPOSAL_VOTES_SPEC
    }

    fn to_row(&self) -> Vec<SqlValue> {
        vec![
            self.proposal_id.clone().into(),
            self.voter_id.clone().into(),
            self.voter_role.clone().into(),
            self.voter_hex.clone().into(),
            self.voter_has_script.into(),
            self.vote.clone().into(),
            self.vote_tx_hash.clone().into(),
            self.block_time.into(),
            self.meta_url.clone().into(),
            self.meta_hash.clone().into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::dedupe;

    fn row(voter_id: &str, role: &str, vote: &str) -> SourceRow {
        SourceRow::new()
            .with("voter_id", voter_id)
            .with("voter_role", role)
            .with("voter_hex", SqlValue::Text(None))
            .with("voter_has_script", false)
            .with("vote", vote)
            .with("vote_tx_hash", "ff")
            .with("block_time", 1_720_000_000_i64)
            .with("meta_url", SqlValue::Text(None))
            .with("meta_hash", SqlValue::Text(None))
    }

    #[test]
    fn test_revote_keeps_newest_row() {
        let request = ProposalVote::fetch_request("governance", "gov_action1p");
        let votes: Vec<ProposalVote> = [
            row("drep1a", "DRep", "Yes"),
            row("drep1a", "DRep", "No"),
            row("pool1a", "SPO", "Abstain"),
            row("drep1a", "SPO", "No"),
        ]
        .iter()
        .map(|r| request.map_row(r).unwrap())
        .collect();

        let unique = dedupe(votes);
        assert_eq!(unique.len(), 3);
        assert_eq!(unique[0].vote, "Yes");
        assert!(unique.iter().all(|v| v.proposal_id == "gov_action1p"));
    }
}
