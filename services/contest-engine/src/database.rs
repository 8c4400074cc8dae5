use crate::errors::{ContestError, Result};
use crate::models::{
    Contestant, LeaderboardEntry, NewContestant, VoteOutcome, VoteRecord, VoteRules,
};
use crate::store::ContestantStore;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Pool, Postgres, Transaction};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

const CONTESTANT_COLUMNS: &str =
    "id, email, name, handle, total_votes, vote_given, created_at";

pub struct Database {
    pool: Pool<Postgres>,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32, min_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        Ok(Database { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Escape LIKE metacharacters and wrap the query for a substring match.
pub fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

/// Add one vote to `contestant_id` and append the vote record, inside `tx`.
async fn credit_contestant(
    tx: &mut Transaction<'_, Postgres>,
    voter_id: Uuid,
    contestant_id: Uuid,
) -> Result<(i64, VoteRecord)> {
    let total_votes: i64 = sqlx::query_scalar(
        r#"
        UPDATE contestants SET total_votes = total_votes + 1
        WHERE id = $1
        RETURNING total_votes
        "#,
    )
    .bind(contestant_id)
    .fetch_one(&mut **tx)
    .await?;

    let record = sqlx::query_as::<_, VoteRecord>(
        r#"
        INSERT INTO votes (id, voter_id, contestant_id, cast_at)
        VALUES ($1, $2, $3, $4)
        RETURNING id, voter_id, contestant_id, cast_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(voter_id)
    .bind(contestant_id)
    .bind(Utc::now())
    .fetch_one(&mut **tx)
    .await?;

    Ok((total_votes, record))
}

/// Postgres-backed contestant registry.
///
/// Counter writes are single `UPDATE … SET x = x + $delta` statements, so the
/// database serialises concurrent increments on a row. Votes additionally lock
/// both rows, in id order, for the length of the transaction.
pub struct PgContestantStore {
    db: std::sync::Arc<Database>,
}

impl PgContestantStore {
    pub fn new(db: std::sync::Arc<Database>) -> Self {
        PgContestantStore { db }
    }

    async fn increment(&self, column: &str, id: Uuid, delta: i64) -> Result<i64> {
        let sql = format!(
            "UPDATE contestants SET {column} = {column} + $2 \
             WHERE id = $1 AND {column} + $2 >= 0 \
             RETURNING {column}"
        );

        let value: Option<i64> = sqlx::query_scalar(&sql)
            .bind(id)
            .bind(delta)
            .fetch_optional(self.db.pool())
            .await?;

        match value {
            Some(v) => Ok(v),
            None if self.get_by_id(id).await?.is_some() => Err(ContestError::Validation(
                "vote counters cannot go negative".to_string(),
            )),
            None => Err(ContestError::ContestantNotFound(id)),
        }
    }
}

#[async_trait]
impl ContestantStore for PgContestantStore {
    async fn get_by_email(&self, email: &str) -> Result<Option<Contestant>> {
        let contestant = sqlx::query_as::<_, Contestant>(&format!(
            "SELECT {CONTESTANT_COLUMNS} FROM contestants WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(contestant)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Contestant>> {
        let contestant = sqlx::query_as::<_, Contestant>(&format!(
            "SELECT {CONTESTANT_COLUMNS} FROM contestants WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(contestant)
    }

    async fn create(&self, new: NewContestant) -> Result<Contestant> {
        let result = sqlx::query_as::<_, Contestant>(&format!(
            r#"
            INSERT INTO contestants (id, email, name, handle, total_votes, vote_given, created_at)
            VALUES ($1, $2, $3, $4, 0, 0, $5)
            RETURNING {CONTESTANT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.email)
        .bind(&new.name)
        .bind(&new.handle)
        .bind(Utc::now())
        .fetch_one(self.db.pool())
        .await;

        match result {
            Ok(contestant) => Ok(contestant),
            Err(e) if is_unique_violation(&e) => Err(ContestError::AlreadyExists(new.email)),
            Err(e) => Err(e.into()),
        }
    }

    async fn increment_total_votes(&self, id: Uuid, delta: i64) -> Result<i64> {
        self.increment("total_votes", id, delta).await
    }

    async fn increment_vote_given(&self, id: Uuid, delta: i64) -> Result<i64> {
        self.increment("vote_given", id, delta).await
    }

    async fn record_vote(
        &self,
        voter_id: Uuid,
        contestant_id: Uuid,
        rules: VoteRules,
    ) -> Result<VoteOutcome> {
        let mut tx = self.db.pool().begin().await?;

        // Lock voter and contestant in id order so crossing votes cannot deadlock.
        let locked: Vec<(Uuid, i64)> = sqlx::query_as(
            r#"
            SELECT id, vote_given FROM contestants
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(vec![voter_id, contestant_id])
        .fetch_all(&mut *tx)
        .await?;

        if !locked.iter().any(|(id, _)| *id == contestant_id) {
            return Err(ContestError::ContestantNotFound(contestant_id));
        }

        let vote_given = locked
            .iter()
            .find(|(id, _)| *id == voter_id)
            .map(|(_, given)| *given)
            .ok_or(ContestError::ContestantNotFound(voter_id))?;

        if vote_given >= rules.vote_cap {
            return Err(ContestError::VoteCapExceeded {
                cap: rules.vote_cap,
            });
        }

        if rules.one_vote_per_contestant {
            let already: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM votes WHERE voter_id = $1 AND contestant_id = $2)",
            )
            .bind(voter_id)
            .bind(contestant_id)
            .fetch_one(&mut *tx)
            .await?;

            if already {
                return Err(ContestError::DuplicateVote(contestant_id));
            }
        }

        let voter_vote_given: i64 = sqlx::query_scalar(
            r#"
            UPDATE contestants SET vote_given = vote_given + 1
            WHERE id = $1 AND vote_given < $2
            RETURNING vote_given
            "#,
        )
        .bind(voter_id)
        .bind(rules.vote_cap)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ContestError::VoteCapExceeded {
            cap: rules.vote_cap,
        })?;

        let (contestant_total_votes, record) =
            credit_contestant(&mut tx, voter_id, contestant_id).await?;

        tx.commit().await?;

        Ok(VoteOutcome {
            record,
            contestant_total_votes,
            voter_vote_given,
        })
    }

    async fn record_first_vote(
        &self,
        voter: NewContestant,
        contestant_id: Uuid,
        rules: VoteRules,
    ) -> Result<(Contestant, VoteOutcome)> {
        let mut tx = self.db.pool().begin().await?;

        let target: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM contestants WHERE id = $1 FOR UPDATE")
                .bind(contestant_id)
                .fetch_optional(&mut *tx)
                .await?;
        if target.is_none() {
            return Err(ContestError::ContestantNotFound(contestant_id));
        }

        if rules.vote_cap < 1 {
            return Err(ContestError::VoteCapExceeded {
                cap: rules.vote_cap,
            });
        }

        // Dropping `tx` on any error below rolls the new voter back.
        let created = sqlx::query_as::<_, Contestant>(&format!(
            r#"
            INSERT INTO contestants (id, email, name, handle, total_votes, vote_given, created_at)
            VALUES ($1, $2, $3, $4, 0, 1, $5)
            RETURNING {CONTESTANT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&voter.email)
        .bind(&voter.name)
        .bind(&voter.handle)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await;

        let created = match created {
            Ok(contestant) => contestant,
            Err(e) if is_unique_violation(&e) => {
                return Err(ContestError::AlreadyExists(voter.email))
            }
            Err(e) => return Err(e.into()),
        };

        let (contestant_total_votes, record) =
            credit_contestant(&mut tx, created.id, contestant_id).await?;

        tx.commit().await?;

        let outcome = VoteOutcome {
            record,
            contestant_total_votes,
            voter_vote_given: created.vote_given,
        };
        Ok((created, outcome))
    }

    async fn ranked(
        &self,
        filter: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<LeaderboardEntry>> {
        let entries = sqlx::query_as::<_, LeaderboardEntry>(&format!(
            r#"
            WITH ranked AS (
                SELECT {CONTESTANT_COLUMNS},
                       ROW_NUMBER() OVER (ORDER BY total_votes DESC, created_at ASC, seq ASC) AS rank
                FROM contestants
            )
            SELECT {CONTESTANT_COLUMNS}, rank
            FROM ranked
            WHERE $1::text IS NULL OR name ILIKE $1 OR handle ILIKE $1
            ORDER BY rank
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(filter.map(like_pattern))
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(self.db.pool())
        .await?;

        Ok(entries)
    }

    async fn count(&self, filter: Option<&str>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM contestants
            WHERE $1::text IS NULL OR name ILIKE $1 OR handle ILIKE $1
            "#,
        )
        .bind(filter.map(like_pattern))
        .fetch_one(self.db.pool())
        .await?;

        Ok(count)
    }

    async fn votes_cast_by(&self, voter_id: Uuid) -> Result<Vec<VoteRecord>> {
        let votes = sqlx::query_as::<_, VoteRecord>(
            r#"
            SELECT id, voter_id, contestant_id, cast_at
            FROM votes
            WHERE voter_id = $1
            ORDER BY cast_at ASC
            "#,
        )
        .bind(voter_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(votes)
    }
}
