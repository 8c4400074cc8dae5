#![allow(dead_code)]

use contest_engine::config::{
    Config, ContestConfig, DatabaseConfig, LeaderboardConfig, NatsConfig, RedisConfig,
    ServerConfig, StorageBackend,
};
use contest_engine::models::{Contestant, EnrollRequest};
use contest_engine::services::ContestService;
use contest_engine::store::{ContestantStore, MemoryContestantStore};
use contest_engine::subscribers::StaticSubscriberDirectory;
use std::sync::Arc;

pub fn test_config(contest: ContestConfig) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8090,
            workers: 1,
        },
        database: DatabaseConfig {
            backend: StorageBackend::Memory,
            url: String::new(),
            max_connections: 1,
            min_connections: 1,
        },
        redis: RedisConfig { url: String::new() },
        nats: NatsConfig {
            url: String::new(),
            topic_prefix: "contest".to_string(),
        },
        contest,
        leaderboard: LeaderboardConfig {
            default_page_size: 10,
            max_page_size: 50,
            cache_ttl_secs: 0,
        },
    }
}

/// A contest service over the in-memory registry.
pub struct Harness {
    pub store: Arc<dyn ContestantStore>,
    pub subscribers: Arc<StaticSubscriberDirectory>,
    pub service: Arc<ContestService>,
}

impl Harness {
    pub fn new(contest: ContestConfig) -> Self {
        Self::with_store(contest, Arc::new(MemoryContestantStore::new()))
    }

    pub fn with_store(contest: ContestConfig, store: Arc<dyn ContestantStore>) -> Self {
        let subscribers = Arc::new(StaticSubscriberDirectory::default());
        let service = Arc::new(ContestService::new(
            &test_config(contest),
            store.clone(),
            subscribers.clone(),
            None,
            None,
        ));

        Harness {
            store,
            subscribers,
            service,
        }
    }

    /// Subscribe `email` and enroll it with `name`.
    pub async fn enroll(&self, email: &str, name: &str) -> Contestant {
        self.subscribers.add(email);
        self.service
            .enroll(EnrollRequest {
                email: email.to_string(),
                name: name.to_string(),
                handle: None,
            })
            .await
            .expect("enrollment succeeds")
    }

    pub async fn contestant(&self, id: uuid::Uuid) -> Contestant {
        self.store
            .get_by_id(id)
            .await
            .expect("registry read")
            .expect("contestant exists")
    }
}
