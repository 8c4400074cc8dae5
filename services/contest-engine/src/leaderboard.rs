use crate::config::LeaderboardConfig;
use crate::errors::Result;
use crate::metrics::{CACHE_HITS, CACHE_MISSES, LEADERBOARD_QUERIES};
use crate::models::{LeaderboardEntry, LeaderboardPage};
use crate::store::ContestantStore;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use tracing::{debug, warn};

const CACHE_PREFIX: &str = "leaderboard:";
const CACHE_PATTERN: &str = "leaderboard:*";

/// Read-only ranked views over the contestant registry.
///
/// Pages may be served from Redis for up to `cache_ttl_secs`, so a vote can
/// take that long to show up here. Enrollment drops the cached pages.
pub struct LeaderboardService {
    store: Arc<dyn ContestantStore>,
    cache: Option<ConnectionManager>,
    config: LeaderboardConfig,
}

impl LeaderboardService {
    pub fn new(
        store: Arc<dyn ContestantStore>,
        cache: Option<ConnectionManager>,
        config: LeaderboardConfig,
    ) -> Self {
        LeaderboardService {
            store,
            cache,
            config,
        }
    }

    fn clamp_page_size(&self, page_size: Option<u32>) -> u32 {
        page_size
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size)
    }

    /// The `n` highest-ranked contestants.
    pub async fn top(&self, n: u32) -> Result<Vec<LeaderboardEntry>> {
        LEADERBOARD_QUERIES.inc();
        let limit = n.min(self.config.max_page_size);
        self.store.list(0, i64::from(limit)).await
    }

    /// One page of the ranking, optionally filtered by a case-insensitive
    /// substring of name or handle. Ranks stay global.
    pub async fn search(
        &self,
        query: Option<&str>,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<LeaderboardPage> {
        LEADERBOARD_QUERIES.inc();

        let filter = query.map(str::trim).filter(|q| !q.is_empty());
        let page = page.unwrap_or(1).max(1);
        let page_size = self.clamp_page_size(page_size);
        let cache_key = format!(
            "{}{}:{}:{}",
            CACHE_PREFIX,
            filter.unwrap_or_default().to_lowercase(),
            page,
            page_size
        );

        if let Some(cached) = self.cached_page(&cache_key).await {
            CACHE_HITS.inc();
            return Ok(cached);
        }
        CACHE_MISSES.inc();

        let offset = i64::from(page - 1) * i64::from(page_size);
        let entries = self
            .store
            .ranked(filter, offset, i64::from(page_size))
            .await?;
        let total_count = self.store.count(filter).await?;

        let result = LeaderboardPage {
            entries,
            total_count,
            page,
            page_size,
        };

        self.store_page(&cache_key, &result).await;

        Ok(result)
    }

    /// Drop every cached page. Called after enrollment so a new contestant
    /// is visible on the next read instead of after the TTL.
    pub async fn invalidate(&self) {
        if self.config.cache_ttl_secs == 0 {
            return;
        }
        let Some(mut conn) = self.cache.clone() else {
            return;
        };

        let mut keys: Vec<String> = Vec::new();
        match conn.scan_match::<_, String>(CACHE_PATTERN).await {
            Ok(mut iter) => {
                while let Some(key) = iter.next_item().await {
                    keys.push(key);
                }
            }
            Err(e) => {
                warn!("Leaderboard cache scan failed: {}", e);
                return;
            }
        }

        if keys.is_empty() {
            return;
        }

        match conn.del::<_, ()>(&keys).await {
            Ok(()) => debug!("Invalidated {} cached leaderboard pages", keys.len()),
            Err(e) => warn!("Leaderboard cache invalidation failed: {}", e),
        }
    }

    async fn cached_page(&self, key: &str) -> Option<LeaderboardPage> {
        if self.config.cache_ttl_secs == 0 {
            return None;
        }
        let mut conn = self.cache.clone()?;

        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(page) => Some(page),
                Err(e) => {
                    warn!("Discarding unreadable leaderboard cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Leaderboard cache read failed, using registry: {}", e);
                None
            }
        }
    }

    async fn store_page(&self, key: &str, page: &LeaderboardPage) {
        if self.config.cache_ttl_secs == 0 {
            return;
        }
        let Some(mut conn) = self.cache.clone() else {
            return;
        };

        let raw = match serde_json::to_string(page) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialise leaderboard page: {}", e);
                return;
            }
        };

        if let Err(e) = conn
            .set_ex::<_, _, ()>(key, raw, self.config.cache_ttl_secs as _)
            .await
        {
            warn!("Leaderboard cache write failed: {}", e);
        } else {
            debug!("Cached leaderboard page {}", key);
        }
    }
}
