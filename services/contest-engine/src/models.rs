use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Longest accepted social handle, in characters.
pub const HANDLE_MAX_LEN: usize = 30;

/// One contest entry; also the voter record of whoever submitted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Contestant {
    pub id: Uuid,
    /// Kept out of public payloads; the leaderboard is world-readable.
    #[serde(skip_serializing, default)]
    pub email: String,
    pub name: String,
    pub handle: Option<String>,
    pub total_votes: i64,
    pub vote_given: i64,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a contestant row. Fields are expected to be normalised.
#[derive(Debug, Clone)]
pub struct NewContestant {
    pub email: String,
    pub name: String,
    pub handle: Option<String>,
}

/// A contestant together with its position in the unfiltered ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LeaderboardEntry {
    pub rank: i64,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub contestant: Contestant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardPage {
    pub entries: Vec<LeaderboardEntry>,
    pub total_count: i64,
    pub page: u32,
    pub page_size: u32,
}

/// Immutable audit row written alongside every successful vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct VoteRecord {
    pub id: Uuid,
    pub voter_id: Uuid,
    pub contestant_id: Uuid,
    pub cast_at: DateTime<Utc>,
}

/// Limits re-checked inside the unit of work that applies a vote.
#[derive(Debug, Clone, Copy)]
pub struct VoteRules {
    pub vote_cap: i64,
    pub one_vote_per_contestant: bool,
}

/// Counters as committed by a vote.
#[derive(Debug, Clone)]
pub struct VoteOutcome {
    pub record: VoteRecord,
    pub contestant_total_votes: i64,
    pub voter_vote_given: i64,
}

/// Validation rules apply to the normalised form, see [`EnrollRequest::normalized`].
#[derive(Debug, Clone, Deserialize, Serialize, validator::Validate)]
pub struct EnrollRequest {
    #[validate(email)]
    pub email: String,
    pub name: String,
    #[validate(length(max = 30))]
    pub handle: Option<String>,
}

impl EnrollRequest {
    /// Email trimmed and lower-cased, name trimmed, handle without its `@`.
    pub fn normalized(self) -> Self {
        EnrollRequest {
            email: normalize_email(&self.email),
            name: self.name.trim().to_string(),
            handle: normalize_handle(self.handle.as_deref()),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CastVoteRequest {
    pub voter_email: String,
    pub contestant_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub vote_id: Uuid,
    pub voter_id: Uuid,
    pub contestant_id: Uuid,
    pub contestant_total_votes: i64,
    pub voter_vote_given: i64,
    pub votes_remaining: i64,
    pub cast_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoterStatus {
    pub voter_id: Uuid,
    pub email: String,
    pub vote_given: i64,
    pub vote_cap: i64,
    pub votes_remaining: i64,
    pub votes: Vec<VoteRecord>,
}

/// Notification published to the message bus.
#[derive(Debug, Serialize, Deserialize)]
pub struct ContestEvent {
    pub event_type: ContestEventType,
    pub contestant_id: Uuid,
    pub voter_id: Option<Uuid>,
    pub email: String,
    pub total_votes: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum ContestEventType {
    ContestantEnrolled,
    VoteCast,
}

/// Trim and lower-case an email so lookups are case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Strip whitespace and a leading `@`; blank handles become `None`.
pub fn normalize_handle(handle: Option<&str>) -> Option<String> {
    handle
        .map(|h| h.trim().trim_start_matches('@').trim().to_string())
        .filter(|h| !h.is_empty())
}
