use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub nats: NatsConfig,
    pub contest: ContestConfig,
    pub leaderboard: LeaderboardConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub backend: StorageBackend,
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// An empty `url` disables the leaderboard cache.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// An empty `url` disables contest notifications.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NatsConfig {
    pub url: String,
    pub topic_prefix: String,
}

/// What happens when someone without a contestant record casts a vote.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VoterPolicy {
    /// Reject with `VoterNotEnrolled`.
    RequireEnrollment,
    /// Create the voter's record on first vote, provided they are a subscriber.
    AutoEnroll,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ContestConfig {
    pub vote_cap: i64,
    pub voter_policy: VoterPolicy,
    pub allow_self_vote: bool,
    pub one_vote_per_contestant: bool,
    pub name_max_len: usize,
    pub vote_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LeaderboardConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// Upper bound on leaderboard staleness; 0 disables caching.
    pub cache_ttl_secs: u64,
}

impl Default for ContestConfig {
    fn default() -> Self {
        ContestConfig {
            vote_cap: 3,
            voter_policy: VoterPolicy::RequireEnrollment,
            allow_self_vote: false,
            one_vote_per_contestant: false,
            name_max_len: 20,
            vote_timeout_ms: 5000,
        }
    }
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        LeaderboardConfig {
            default_page_size: 20,
            max_page_size: 100,
            cache_ttl_secs: 5,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8090)?
            .set_default("server.workers", 4)?
            .set_default("database.backend", "postgres")?
            .set_default("database.url", "")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("redis.url", "")?
            .set_default("nats.url", "")?
            .set_default("nats.topic_prefix", "contest")?
            .set_default("contest.vote_cap", 3)?
            .set_default("contest.voter_policy", "require_enrollment")?
            .set_default("contest.allow_self_vote", false)?
            .set_default("contest.one_vote_per_contestant", false)?
            .set_default("contest.name_max_len", 20)?
            .set_default("contest.vote_timeout_ms", 5000)?
            .set_default("leaderboard.default_page_size", 20)?
            .set_default("leaderboard.max_page_size", 100)?
            .set_default("leaderboard.cache_ttl_secs", 5)?;

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder.add_source(
                File::with_name(&format!("config/{}", environment)).required(false),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("CONTEST_ENGINE")
                .separator("__")
                .try_parsing(true),
        );

        if let Ok(db_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", db_url)?;
        }

        if let Ok(redis_url) = env::var("REDIS_URL") {
            builder = builder.set_override("redis.url", redis_url)?;
        }

        if let Ok(nats_url) = env::var("NATS_URL") {
            builder = builder.set_override("nats.url", nats_url)?;
        }

        if let Ok(port) = env::var("CONTEST_ENGINE_PORT") {
            builder = builder.set_override("server.port", port)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.database.backend == StorageBackend::Postgres && self.database.url.is_empty() {
            return Err("Database URL is required for the postgres backend".to_string());
        }

        self.contest.validate()?;
        self.leaderboard.validate()
    }
}

impl ContestConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.vote_cap <= 0 {
            return Err("Vote cap must be positive".to_string());
        }

        if self.name_max_len == 0 {
            return Err("Maximum name length must be positive".to_string());
        }

        if self.vote_timeout_ms == 0 {
            return Err("Vote timeout must be positive".to_string());
        }

        Ok(())
    }
}

impl LeaderboardConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err("Page sizes must be positive".to_string());
        }

        if self.default_page_size > self.max_page_size {
            return Err("Default page size cannot exceed the maximum".to_string());
        }

        Ok(())
    }
}
