use crate::config::Config;
use crate::enrollment::EnrollmentService;
use crate::errors::Result;
use crate::leaderboard::LeaderboardService;
use crate::ledger::VoteLedger;
use crate::models::{
    Contestant, EnrollRequest, LeaderboardEntry, LeaderboardPage, VoteReceipt, VoterStatus,
};
use crate::nats::NatsProducer;
use crate::store::ContestantStore;
use crate::subscribers::SubscriberDirectory;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use uuid::Uuid;

/// The three external operations plus the supporting reads, behind one handle.
pub struct ContestService {
    ledger: VoteLedger,
    leaderboard: LeaderboardService,
    enrollment: EnrollmentService,
}

impl ContestService {
    pub fn new(
        config: &Config,
        store: Arc<dyn ContestantStore>,
        subscribers: Arc<dyn SubscriberDirectory>,
        nats: Option<Arc<NatsProducer>>,
        redis: Option<ConnectionManager>,
    ) -> Self {
        ContestService {
            ledger: VoteLedger::new(
                store.clone(),
                subscribers.clone(),
                nats.clone(),
                config.contest.clone(),
            ),
            leaderboard: LeaderboardService::new(store.clone(), redis, config.leaderboard.clone()),
            enrollment: EnrollmentService::new(
                store,
                subscribers,
                nats,
                config.contest.name_max_len,
            ),
        }
    }

    pub async fn cast_vote(&self, voter_email: &str, contestant_id: Uuid) -> Result<VoteReceipt> {
        self.ledger.cast_vote(voter_email, contestant_id).await
    }

    pub async fn voter_status(&self, voter_email: &str) -> Result<VoterStatus> {
        self.ledger.voter_status(voter_email).await
    }

    pub async fn enroll(&self, request: EnrollRequest) -> Result<Contestant> {
        let contestant = self.enrollment.enroll(request).await?;
        self.leaderboard.invalidate().await;
        Ok(contestant)
    }

    pub async fn get_contestant(&self, id: Uuid) -> Result<Contestant> {
        self.enrollment.get_contestant(id).await
    }

    pub async fn get_leaderboard(
        &self,
        page: Option<u32>,
        page_size: Option<u32>,
        query: Option<&str>,
    ) -> Result<LeaderboardPage> {
        self.leaderboard.search(query, page, page_size).await
    }

    pub async fn top(&self, n: u32) -> Result<Vec<LeaderboardEntry>> {
        self.leaderboard.top(n).await
    }
}
