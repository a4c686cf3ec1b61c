use super::source_function_sql;
use crate::constants::tables;
use crate::database::SqlValue;
use crate::source::{FetchRequest, MappingError, SourceRow};
use crate::sync::{BatchUpsertSpec, DedupePolicy, UpsertRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;

/// Constitutional committee composition attached to a governance action.
///
/// Source columns: `proposal_id, proposal_tx_hash, proposal_index,
/// quorum_numerator, quorum_denominator, members(json)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitteeInfo {
    pub proposal_id: String,
    pub proposal_tx_hash: String,
    pub proposal_index: i64,
    pub quorum_numerator: Option<i64>,
    pub quorum_denominator: Option<i64>,
    pub members: Option<JsonValue>,
}

static COMMITTEE_INFO_SPEC: BatchUpsertSpec = BatchUpsertSpec {
    table: tables::COMMITTEE_INFO,
    columns: &[
        "proposal_id",
        "proposal_tx_hash",
        "proposal_index",
        "quorum_numerator",
        "quorum_denominator",
        "members",
    ],
    conflict_keys: &["proposal_id", "proposal_tx_hash", "proposal_index"],
    updateable: &["quorum_numerator", "quorum_denominator", "members"],
    dedupe: DedupePolicy::KeepFirst,
};

impl CommitteeInfo {
    pub const FUNCTION: &'static str = "get_committee_info";

    pub fn from_row(row: &SourceRow) -> Result<Self, MappingError> {
        Ok(Self {
            proposal_id: row.text("proposal_id")?,
            proposal_tx_hash: row.text("proposal_tx_hash")?,
            proposal_index: row.i64("proposal_index")?,
            quorum_numerator: row.opt_i64("quorum_numerator")?,
            quorum_denominator: row.opt_i64("quorum_denominator")?,
            members: row.opt_json("members")?,
        })
    }

    pub fn fetch_request(schema: &str) -> FetchRequest<Self> {
        FetchRequest::new(Self::FUNCTION, source_function_sql(schema, Self::FUNCTION, 0), Self::from_row)
    }

    /// Hot credential ids listed in `members`.
    ///
    /// Accepts both an array of member objects carrying `cc_hot_id` and a plain
    /// array of id strings; members without a hot key are skipped.
    pub fn member_hot_ids(&self) -> Vec<String> {
        let Some(JsonValue::Array(members)) = &self.members else {
            return Vec::new();
        };
        members
            .iter()
            .filter_map(|member| match member {
                JsonValue::String(id) => Some(id.as_str()),
                JsonValue::Object(fields) => fields.get("cc_hot_id").and_then(JsonValue::as_str),
                _ => None,
            })
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Distinct hot ids across every committee snapshot, sorted
pub fn member_hot_ids(infos: &[CommitteeInfo]) -> Vec<String> {
    infos
        .iter()
        .flat_map(CommitteeInfo::member_hot_ids)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

impl UpsertRecord for CommitteeInfo {
    fn spec() -> &'static BatchUpsertSpec {
        &COMMITTEE_INFO_SPEC
    }

    fn to_row(&self) -> Vec<SqlValue> {
        vec![
            self.proposal_id.clone().into(),
            self.proposal_tx_hash.clone().into(),
            self.proposal_index.into(),
            self.quorum_numerator.into(),
            self.quorum_denominator.into(),
            self.members.clone().into(),
        ]
    }
}

/// One committee member's vote on a governance action.
///
/// Source columns: `proposal_id, proposal_tx_hash, proposal_index, vote_tx_hash,
/// block_time, vote, meta_url, meta_hash`, plus `cc_hot_id` when the function
/// echoes its argument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitteeVote {
    pub cc_hot_id: String,
    pub proposal_id: String,
    pub proposal_tx_hash: Option<String>,
    pub proposal_index: Option<i64>,
    pub vote_tx_hash: String,
    pub block_time: Option<DateTime<Utc>>,
    pub vote: String,
    pub meta_url: Option<String>,
    pub meta_hash: Option<String>,
}

static COMMITTEE_VOTES_SPEC: BatchUpsertSpec = BatchUpsertSpec {
    table: tables::COMMITTEE_VOTES,
    columns: &[
        "cc_hot_id",
        "proposal_id",
        "proposal_tx_hash",
        "proposal_index",
        "vote_tx_hash",
        "block_time",
        "vote",
        "meta_url",
        "meta_hash",
    ],
    conflict_keys: &["cc_hot_id", "proposal_id", "vote_tx_hash"],
    updateable: &[
        "proposal_tx_hash",
        "proposal_index",
        "block_time",
        "vote",
        "meta_url",
        "meta_hash",
    ],
    dedupe: DedupePolicy::KeepFirst,
};

impl CommitteeVote {
    pub const FUNCTION: &'static str = "get_committee_votes";

    pub fn from_row(row: &SourceRow, cc_hot_id: &str) -> Result<Self, MappingError> {
        let cc_hot_id = match row.get("cc_hot_id") {
            Some(_) => row.opt_text("cc_hot_id")?.unwrap_or_else(|| cc_hot_id.to_string()),
            None => cc_hot_id.to_string(),
        };
        Ok(Self {
            cc_hot_id,
            proposal_id: row.text("proposal_id")?,
            proposal_tx_hash: row.opt_text("proposal_tx_hash")?,
            proposal_index: row.opt_i64("proposal_index")?,
            vote_tx_hash: row.text("vote_tx_hash")?,
            block_time: row.opt_timestamp("block_time")?,
            vote: row.text("vote")?,
            meta_url: row.opt_text("meta_url")?,
            meta_hash: row.opt_text("meta_hash")?,
        })
    }

    pub fn fetch_request(schema: &str, cc_hot_id: &str) -> FetchRequest<Self> {
        let member = cc_hot_id.to_string();
        FetchRequest::new(
            Self::FUNCTION,
            source_function_sql(schema, Self::FUNCTION, 1),
            move |row| Self::from_row(row, &member),
        )
        .bind(cc_hot_id)
    }
}

impl UpsertRecord for CommitteeVote {
    fn spec() -> &'static BatchUpsertSpec {
        &COMMITTEE_VOTES_SPEC
    }

    fn to_row(&self) -> Vec<SqlValue> {
        vec![
            self.cc_hot_id.clone().into(),
            self.proposal_id.clone().into(),
            self.proposal_tx_hash.clone().into(),
            self.proposal_index.into(),
            self.vote_tx_hash.clone().into(),
            self.block_time.into(),
            self.vote.clone().into(),
            self.meta_url.clone().into(),
            self.meta_hash.clone().into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn info(members: JsonValue) -> CommitteeInfo {
        CommitteeInfo {
            proposal_id: "gov_action1abc".to_string(),
            proposal_tx_hash: "aa".to_string(),
            proposal_index: 0,
            quorum_numerator: Some(2),
            quorum_denominator: Some(3),
            members: Some(members),
        }
    }

    #[test]
    fn test_member_hot_ids_from_objects_and_strings() {
        let a = info(json!([
            {"cc_hot_id": "cc_hot1b", "cc_cold_id": "cc_cold1", "expiration_epoch": 580},
            {"cc_cold_id": "cc_cold2"},
            {"cc_hot_id": ""},
        ]));
        let b = info(json!(["cc_hot1a", "cc_hot1b"]));

        assert_eq!(a.member_hot_ids(), vec!["cc_hot1b"]);
        assert_eq!(member_hot_ids(&[a, b]), vec!["cc_hot1a", "cc_hot1b"]);
    }

    #[test]
    fn test_members_without_array_yield_nothing() {
        assert!(info(json!({"cc_hot_id": "x"})).member_hot_ids().is_empty());
    }

    #[test]
    fn test_committee_info_from_row_parses_text_json() {
        let row = SourceRow::new()
            .with("proposal_id", "gov_action1abc")
            .with("proposal_tx_hash", "aa")
            .with("proposal_index", 1_i64)
            .with("quorum_numerator", 2_i64)
            .with("quorum_denominator", SqlValue::Int(None))
            .with("members", r#"["cc_hot1a"]"#);

        let record = CommitteeInfo::from_row(&row).unwrap();
        assert_eq!(record.member_hot_ids(), vec!["cc_hot1a"]);
        assert_eq!(record.quorum_denominator, None);
    }

    #[test]
    fn test_committee_vote_takes_member_id_from_request() {
        let request = CommitteeVote::fetch_request("governance", "cc_hot1a");
        assert_eq!(request.statement().sql, "SELECT * FROM governance.get_committee_votes($1)");

        let row = SourceRow::new()
            .with("proposal_id", "gov_action1abc")
            .with("proposal_tx_hash", "aa")
            .with("proposal_index", 0_i64)
            .with("vote_tx_hash", "bb")
            .with("block_time", 1_700_000_000_i64)
            .with("vote", "Yes")
            .with("meta_url", SqlValue::Text(None))
            .with("meta_hash", SqlValue::Text(None));
        let vote = request.map_row(&row).unwrap();

        assert_eq!(vote.cc_hot_id, "cc_hot1a");
        assert_eq!(vote.block_time.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(vote.to_row().len(), CommitteeVote::spec().columns.len());
    }
}
