use crate::errors::{ContestError, Result};
use crate::metrics::ENROLLMENTS;
use crate::models::{
    ContestEvent, ContestEventType, Contestant, EnrollRequest, NewContestant, HANDLE_MAX_LEN,
};
use crate::nats::NatsProducer;
use crate::store::ContestantStore;
use crate::subscribers::SubscriberDirectory;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Turns subscribers into contestants (the waitlist join).
pub struct EnrollmentService {
    store: Arc<dyn ContestantStore>,
    subscribers: Arc<dyn SubscriberDirectory>,
    events: Option<Arc<NatsProducer>>,
    name_max_len: usize,
}

impl EnrollmentService {
    pub fn new(
        store: Arc<dyn ContestantStore>,
        subscribers: Arc<dyn SubscriberDirectory>,
        events: Option<Arc<NatsProducer>>,
        name_max_len: usize,
    ) -> Self {
        EnrollmentService {
            store,
            subscribers,
            events,
            name_max_len,
        }
    }

    pub async fn enroll(&self, request: EnrollRequest) -> Result<Contestant> {
        let request = request.normalized();
        validator::Validate::validate(&request)?;

        let new = self.check_entry(request)?;

        if !self.subscribers.is_subscriber(&new.email).await? {
            return Err(ContestError::VoterNotSubscribed(new.email));
        }

        if self.store.get_by_email(&new.email).await?.is_some() {
            return Err(ContestError::AlreadyExists(new.email));
        }

        // The registry's unique email still decides concurrent joins.
        let contestant = self.store.create(new).await?;

        ENROLLMENTS.inc();
        info!(
            "Enrolled contestant {} with entry {:?}",
            contestant.id, contestant.name
        );

        self.publish_enrolled(&contestant).await;

        Ok(contestant)
    }

    pub async fn get_contestant(&self, id: Uuid) -> Result<Contestant> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or(ContestError::ContestantNotFound(id))
    }

    fn check_entry(&self, request: EnrollRequest) -> Result<NewContestant> {
        let name_len = request.name.chars().count();
        if name_len == 0 {
            return Err(ContestError::Validation("name must not be empty".to_string()));
        }
        if name_len > self.name_max_len {
            return Err(ContestError::Validation(format!(
                "name must be at most {} characters",
                self.name_max_len
            )));
        }

        if request
            .handle
            .as_ref()
            .map(|h| h.chars().count() > HANDLE_MAX_LEN)
            .unwrap_or(false)
        {
            return Err(ContestError::Validation(format!(
                "handle must be at most {} characters",
                HANDLE_MAX_LEN
            )));
        }

        Ok(NewContestant {
            email: request.email,
            name: request.name,
            handle: request.handle,
        })
    }

    async fn publish_enrolled(&self, contestant: &Contestant) {
        let Some(events) = &self.events else {
            return;
        };

        let event = ContestEvent {
            event_type: ContestEventType::ContestantEnrolled,
            contestant_id: contestant.id,
            voter_id: None,
            email: contestant.email.clone(),
            total_votes: contestant.total_votes,
            timestamp: Utc::now(),
        };

        if let Err(e) = events.publish_contest_event(&event).await {
            error!("Failed to publish enrollment event: {}", e);
        }
    }
}
