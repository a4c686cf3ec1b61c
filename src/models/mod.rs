//! # Dataset Models
//!
//! One typed record per replicated dataset. Each model owns:
//!
//! - its row mapper (`from_row`), reading the fixed column set of its source function
//! - the [`FetchRequest`](crate::source::FetchRequest) that calls that function
//! - its [`BatchUpsertSpec`](crate::sync::BatchUpsertSpec) and
//!   [`UpsertRecord`](crate::sync::UpsertRecord) implementation
//!
//! ## Datasets
//!
//! | record | source function | destination table |
//! |---|---|---|
//! | [`CommitteeInfo`] | `get_committee_info()` | `committee_info` |
//! | [`CommitteeVote`] | `get_committee_votes(cc_hot_id)` | `committee_votes` |
//! | [`TreasuryWithdrawal`] | `get_treasury_withdrawals()` | `treasury_withdrawals` |
//! | [`TotalsRow`] | `get_totals()` | `totals` |
//! | [`Proposal`] | `get_proposal_list()` | `proposals` |
//! | [`ProposalVote`] | `get_proposal_votes(proposal_id)` | `proposal_votes` |
//! | [`VotingSummary`] | `get_proposal_voting_summary(proposal_id)` | `proposal_voting_summary` |
//! | [`DrepRecord`] | `get_drep_list()` | `dreps` |

pub mod committee;
pub mod drep;
pub mod proposal;
pub mod proposal_vote;
pub mod totals;
pub mod treasury;
pub mod voting_summary;

pub use committee::{member_hot_ids, CommitteeInfo, CommitteeVote};
pub use drep::DrepRecord;
pub use proposal::{proposal_ids_request, Proposal};
pub use proposal_vote::ProposalVote;
pub use totals::TotalsRow;
pub use treasury::TreasuryWithdrawal;
pub use voting_summary::VotingSummary;

/// `SELECT * FROM <schema>.<function>($1, ..., $arity)`
pub(crate) fn source_function_sql(schema: &str, function: &str, arity: usize) -> String {
    let params = (1..=arity).map(|i| format!("${i}")).collect::<Vec<_>>().join(", ");
    format!("SELECT * FROM {schema}.{function}({params})")
}
