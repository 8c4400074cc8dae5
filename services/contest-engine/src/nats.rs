use crate::errors::{ContestError, Result};
use crate::models::ContestEvent;
use async_nats::Client;
use tracing::info;

pub struct NatsProducer {
    client: Client,
    topic_prefix: String,
}

impl NatsProducer {
    pub async fn new(url: &str, topic_prefix: &str) -> Result<Self> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| ContestError::Nats(e.to_string()))?;

        info!("Connected to NATS at {}", url);

        Ok(NatsProducer {
            client,
            topic_prefix: topic_prefix.to_string(),
        })
    }

    pub fn subject(&self) -> String {
        events_subject(&self.topic_prefix)
    }

    pub async fn publish_contest_event(&self, event: &ContestEvent) -> Result<()> {
        let subject = self.subject();
        let payload = serde_json::to_vec(event)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| ContestError::Nats(format!("Failed to publish event: {}", e)))?;

        info!(
            "Published contest event: {:?} for contestant {} to subject {}",
            event.event_type, event.contestant_id, subject
        );

        Ok(())
    }
}

fn events_subject(topic_prefix: &str) -> String {
    format!("{}.contest.events", topic_prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContestEventType;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_events_subject() {
        assert_eq!(events_subject("contest"), "contest.contest.events");
        assert_eq!(events_subject("staging"), "staging.contest.events");
    }

    #[test]
    fn test_event_payload_shape() {
        let event = ContestEvent {
            event_type: ContestEventType::VoteCast,
            contestant_id: Uuid::new_v4(),
            voter_id: Some(Uuid::new_v4()),
            email: "v@contest.io".to_string(),
            total_votes: 4,
            timestamp: Utc::now(),
        };

        let payload: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(payload["total_votes"], 4);
        assert!(payload["voter_id"].is_string());
    }
}
