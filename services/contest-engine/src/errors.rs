use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, ContestError>;

/// Coarse classification a client can branch on without string-matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    /// Safe to re-read current state, never safe to blindly repeat a mutation.
    Transient,
    InvalidInput,
    Internal,
}

#[derive(Error, Debug)]
pub enum ContestError {
    #[error("Voter not enrolled: {0}")]
    VoterNotEnrolled(String),

    #[error("Contestant not found: {0}")]
    ContestantNotFound(Uuid),

    #[error("Not a subscriber: {0}")]
    VoterNotSubscribed(String),

    #[error("Contestant already exists for {0}")]
    AlreadyExists(String),

    #[error("Vote cap exceeded: all {cap} votes already used")]
    VoteCapExceeded { cap: i64 },

    #[error("Voting for your own entry is not allowed")]
    SelfVoteForbidden,

    #[error("Already voted for contestant {0}")]
    DuplicateVote(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Vote outcome unknown after {0} ms, query current state before retrying")]
    OutcomeUnknown(u64),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("NATS error: {0}")]
    Nats(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for ContestError {
    fn from(err: serde_json::Error) -> Self {
        ContestError::Internal(format!("JSON serialization error: {}", err))
    }
}

impl From<validator::ValidationErrors> for ContestError {
    fn from(err: validator::ValidationErrors) -> Self {
        ContestError::Validation(err.to_string())
    }
}

impl ContestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContestError::VoterNotEnrolled(_)
            | ContestError::ContestantNotFound(_)
            | ContestError::VoterNotSubscribed(_) => ErrorKind::NotFound,
            ContestError::AlreadyExists(_)
            | ContestError::VoteCapExceeded { .. }
            | ContestError::SelfVoteForbidden
            | ContestError::DuplicateVote(_) => ErrorKind::Conflict,
            ContestError::Validation(_) => ErrorKind::InvalidInput,
            ContestError::OutcomeUnknown(_)
            | ContestError::Database(_)
            | ContestError::Redis(_)
            | ContestError::Nats(_) => ErrorKind::Transient,
            ContestError::Migration(_) | ContestError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ContestError::VoterNotEnrolled(_) => "voter_not_enrolled",
            ContestError::ContestantNotFound(_) => "contestant_not_found",
            ContestError::VoterNotSubscribed(_) => "voter_not_subscribed",
            ContestError::AlreadyExists(_) => "already_exists",
            ContestError::VoteCapExceeded { .. } => "vote_cap_exceeded",
            ContestError::SelfVoteForbidden => "self_vote_forbidden",
            ContestError::DuplicateVote(_) => "duplicate_vote",
            ContestError::Validation(_) => "validation_error",
            ContestError::OutcomeUnknown(_) => "outcome_unknown",
            ContestError::Database(_) => "storage_unavailable",
            ContestError::Redis(_) => "cache_error",
            ContestError::Nats(_) => "messaging_error",
            ContestError::Migration(_) | ContestError::Internal(_) => "internal_error",
        }
    }
}

impl ResponseError for ContestError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        HttpResponse::build(status_code).json(json!({
            "error": {
                "code": status_code.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
                "kind": self.kind(),
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ContestError::VoterNotEnrolled(_) => StatusCode::NOT_FOUND,
            ContestError::ContestantNotFound(_) => StatusCode::NOT_FOUND,
            ContestError::VoterNotSubscribed(_) => StatusCode::FORBIDDEN,
            ContestError::AlreadyExists(_) => StatusCode::CONFLICT,
            ContestError::VoteCapExceeded { .. } => StatusCode::CONFLICT,
            ContestError::SelfVoteForbidden => StatusCode::CONFLICT,
            ContestError::DuplicateVote(_) => StatusCode::CONFLICT,
            ContestError::Validation(_) => StatusCode::BAD_REQUEST,
            ContestError::OutcomeUnknown(_) => StatusCode::GATEWAY_TIMEOUT,
            ContestError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            ContestError::Redis(_) => StatusCode::SERVICE_UNAVAILABLE,
            ContestError::Nats(_) => StatusCode::SERVICE_UNAVAILABLE,
            ContestError::Migration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ContestError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
