//! Vote accounting
//!
//! [`VoteLedger`] decides whether a voter may cast a vote right now and hands
//! the accepted vote to [`ContestantStore::record_vote`], which re-checks the
//! cap inside its own unit of work. The checks here are a fast path for the
//! common rejections; the store is the authority under concurrency.
//! An auto-enrolled voter is created by [`ContestantStore::record_first_vote`]
//! together with its first vote, never on its own.
//!
//! Votes are never retried. A vote that times out reports `OutcomeUnknown`
//! and the caller should read [`VoteLedger::voter_status`] before trying
//! again.

use crate::config::{ContestConfig, VoterPolicy};
use crate::errors::{ContestError, Result};
use crate::metrics::{VOTES_CAST, VOTES_REJECTED, VOTE_DURATION};
use crate::models::{
    normalize_email, ContestEvent, ContestEventType, Contestant, NewContestant, VoteOutcome,
    VoteReceipt, VoteRules, VoterStatus,
};
use crate::nats::NatsProducer;
use crate::store::ContestantStore;
use crate::subscribers::SubscriberDirectory;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

enum Voter {
    Enrolled(Contestant),
    Pending(NewContestant),
}

pub struct VoteLedger {
    store: Arc<dyn ContestantStore>,
    subscribers: Arc<dyn SubscriberDirectory>,
    events: Option<Arc<NatsProducer>>,
    config: ContestConfig,
}

impl VoteLedger {
    pub fn new(
        store: Arc<dyn ContestantStore>,
        subscribers: Arc<dyn SubscriberDirectory>,
        events: Option<Arc<NatsProducer>>,
        config: ContestConfig,
    ) -> Self {
        VoteLedger {
            store,
            subscribers,
            events,
            config,
        }
    }

    pub fn vote_cap(&self) -> i64 {
        self.config.vote_cap
    }

    fn rules(&self) -> VoteRules {
        VoteRules {
            vote_cap: self.config.vote_cap,
            one_vote_per_contestant: self.config.one_vote_per_contestant,
        }
    }

    /// Cast one vote from `voter_email` for `contestant_id`.
    pub async fn cast_vote(&self, voter_email: &str, contestant_id: Uuid) -> Result<VoteReceipt> {
        let timer = VOTE_DURATION.start_timer();
        let timeout_ms = self.config.vote_timeout_ms;

        let result = match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.apply_vote(voter_email, contestant_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ContestError::OutcomeUnknown(timeout_ms)),
        };

        timer.observe_duration();

        match &result {
            Ok(receipt) => {
                VOTES_CAST.inc();
                info!(
                    "Vote {} from {} to {} (total {}, {} votes left)",
                    receipt.vote_id,
                    receipt.voter_id,
                    receipt.contestant_id,
                    receipt.contestant_total_votes,
                    receipt.votes_remaining
                );
                self.publish_vote(receipt, voter_email).await;
            }
            Err(e) => {
                VOTES_REJECTED.with_label_values(&[e.error_type()]).inc();
                warn!("Vote for {} rejected: {}", contestant_id, e);
            }
        }

        result
    }

    async fn apply_vote(&self, voter_email: &str, contestant_id: Uuid) -> Result<VoteReceipt> {
        let email = normalize_email(voter_email);
        if !validator::validate_email(email.as_str()) {
            return Err(ContestError::Validation(format!(
                "invalid voter email: {}",
                voter_email
            )));
        }

        let voter = self.resolve_voter(&email).await?;

        let contestant = self
            .store
            .get_by_id(contestant_id)
            .await?
            .ok_or(ContestError::ContestantNotFound(contestant_id))?;

        let (voter_id, outcome) = match voter {
            Voter::Enrolled(voter) => (voter.id, self.vote_as(&voter, &contestant).await?),
            Voter::Pending(new) => match self
                .store
                .record_first_vote(new, contestant.id, self.rules())
                .await
            {
                Ok((voter, outcome)) => {
                    info!("Auto-enrolled voter {} as contestant {}", email, voter.id);
                    (voter.id, outcome)
                }
                // A concurrent first vote from the same voter created the record.
                Err(ContestError::AlreadyExists(_)) => {
                    let voter = self
                        .store
                        .get_by_email(&email)
                        .await?
                        .ok_or_else(|| ContestError::VoterNotEnrolled(email.clone()))?;
                    (voter.id, self.vote_as(&voter, &contestant).await?)
                }
                Err(e) => return Err(e),
            },
        };

        Ok(VoteReceipt {
            vote_id: outcome.record.id,
            voter_id,
            contestant_id: contestant.id,
            contestant_total_votes: outcome.contestant_total_votes,
            voter_vote_given: outcome.voter_vote_given,
            votes_remaining: (self.config.vote_cap - outcome.voter_vote_given).max(0),
            cast_at: outcome.record.cast_at,
        })
    }

    async fn vote_as(&self, voter: &Contestant, contestant: &Contestant) -> Result<VoteOutcome> {
        if voter.id == contestant.id && !self.config.allow_self_vote {
            return Err(ContestError::SelfVoteForbidden);
        }

        if voter.vote_given >= self.config.vote_cap {
            return Err(ContestError::VoteCapExceeded {
                cap: self.config.vote_cap,
            });
        }

        self.store
            .record_vote(voter.id, contestant.id, self.rules())
            .await
    }

    /// Looks the voter up without writing anything. Under `AutoEnroll` an
    /// unknown subscriber comes back as a record to create with the vote.
    async fn resolve_voter(&self, email: &str) -> Result<Voter> {
        if let Some(voter) = self.store.get_by_email(email).await? {
            return Ok(Voter::Enrolled(voter));
        }

        match self.config.voter_policy {
            VoterPolicy::RequireEnrollment => Err(ContestError::VoterNotEnrolled(email.to_string())),
            VoterPolicy::AutoEnroll => {
                if !self.subscribers.is_subscriber(email).await? {
                    return Err(ContestError::VoterNotSubscribed(email.to_string()));
                }

                Ok(Voter::Pending(NewContestant {
                    email: email.to_string(),
                    name: voter_name(email, self.config.name_max_len),
                    handle: None,
                }))
            }
        }
    }

    /// Current vote usage for a voter; the safe read after an unknown outcome.
    pub async fn voter_status(&self, voter_email: &str) -> Result<VoterStatus> {
        let email = normalize_email(voter_email);
        let voter = self
            .store
            .get_by_email(&email)
            .await?
            .ok_or_else(|| ContestError::VoterNotEnrolled(email.clone()))?;

        let votes = self.store.votes_cast_by(voter.id).await?;

        Ok(VoterStatus {
            voter_id: voter.id,
            email: voter.email,
            vote_given: voter.vote_given,
            vote_cap: self.config.vote_cap,
            votes_remaining: (self.config.vote_cap - voter.vote_given).max(0),
            votes,
        })
    }

    async fn publish_vote(&self, receipt: &VoteReceipt, voter_email: &str) {
        let Some(events) = &self.events else {
            return;
        };

        let event = ContestEvent {
            event_type: ContestEventType::VoteCast,
            contestant_id: receipt.contestant_id,
            voter_id: Some(receipt.voter_id),
            email: normalize_email(voter_email),
            total_votes: receipt.contestant_total_votes,
            timestamp: receipt.cast_at,
        };

        if let Err(e) = events.publish_contest_event(&event).await {
            error!("Failed to publish vote event: {}", e);
        }
    }
}

/// Display name for an auto-enrolled voter: the email's local part.
fn voter_name(email: &str, max_len: usize) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let name: String = local.chars().take(max_len).collect();
    if name.is_empty() {
        "voter".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voter_name_uses_local_part() {
        assert_eq!(voter_name("night.owl@example.com", 20), "night.owl");
    }

    #[test]
    fn test_voter_name_truncates_by_chars() {
        assert_eq!(voter_name("ééééé@example.com", 3), "ééé");
    }

    #[test]
    fn test_voter_name_fallback() {
        assert_eq!(voter_name("@example.com", 20), "voter");
    }
}
