//! Contestant registry
//!
//! [`ContestantStore`] is the only writer of contestant counters. Every
//! implementation must apply [`ContestantStore::record_vote`] as a single
//! unit of work: the cap is re-checked against the committed `vote_given`
//! while the voter is locked, and both increments plus the vote record land
//! together or not at all.
//!
//! Ranking order everywhere is `total_votes DESC, created_at ASC`, with
//! insertion order as the final tie-break.

use crate::errors::{ContestError, Result};
use crate::models::{
    Contestant, LeaderboardEntry, NewContestant, VoteOutcome, VoteRecord, VoteRules,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Timelike, Utc};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::HashMap;
use uuid::Uuid;

#[async_trait]
pub trait ContestantStore: Send + Sync {
    async fn get_by_email(&self, email: &str) -> Result<Option<Contestant>>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Contestant>>;

    /// Fails with `AlreadyExists` if the email already has a contestant.
    async fn create(&self, new: NewContestant) -> Result<Contestant>;

    async fn increment_total_votes(&self, id: Uuid, delta: i64) -> Result<i64>;

    async fn increment_vote_given(&self, id: Uuid, delta: i64) -> Result<i64>;

    /// Apply one vote atomically: `voter.vote_given += 1`,
    /// `contestant.total_votes += 1` and a new vote record.
    async fn record_vote(
        &self,
        voter_id: Uuid,
        contestant_id: Uuid,
        rules: VoteRules,
    ) -> Result<VoteOutcome>;

    /// Create `voter` and apply its first vote in the same unit of work, so a
    /// rejected or abandoned vote never leaves the new record behind.
    /// Fails with `AlreadyExists` if the email already has a contestant.
    async fn record_first_vote(
        &self,
        voter: NewContestant,
        contestant_id: Uuid,
        rules: VoteRules,
    ) -> Result<(Contestant, VoteOutcome)>;

    /// Ranked entries matching `filter` (case-insensitive substring of name
    /// or handle). Ranks are positions in the unfiltered ordering.
    async fn ranked(
        &self,
        filter: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<LeaderboardEntry>>;

    async fn count(&self, filter: Option<&str>) -> Result<i64>;

    async fn votes_cast_by(&self, voter_id: Uuid) -> Result<Vec<VoteRecord>>;

    /// Unfiltered ranking page.
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<LeaderboardEntry>> {
        self.ranked(None, offset, limit).await
    }
}

#[derive(Debug, Clone)]
struct Row {
    contestant: Contestant,
    seq: u64,
}

#[derive(Default)]
struct Table {
    rows: HashMap<Uuid, Row>,
    by_email: HashMap<String, Uuid>,
    votes: Vec<VoteRecord>,
    next_seq: u64,
    last_created_at: Option<DateTime<Utc>>,
}

impl Table {
    fn row_mut(&mut self, id: Uuid) -> Result<&mut Row> {
        self.rows
            .get_mut(&id)
            .ok_or(ContestError::ContestantNotFound(id))
    }

    /// Creation timestamps strictly increase, at the same microsecond
    /// resolution Postgres keeps.
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let now = truncate_micros(Utc::now());
        let created_at = match self.last_created_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(created_at);
        created_at
    }

    fn insert(&mut self, new: NewContestant) -> Result<Contestant> {
        if self.by_email.contains_key(&new.email) {
            return Err(ContestError::AlreadyExists(new.email));
        }

        let contestant = Contestant {
            id: Uuid::new_v4(),
            email: new.email,
            name: new.name,
            handle: new.handle,
            total_votes: 0,
            vote_given: 0,
            created_at: self.next_created_at(),
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_email.insert(contestant.email.clone(), contestant.id);
        self.rows.insert(
            contestant.id,
            Row {
                contestant: contestant.clone(),
                seq,
            },
        );

        Ok(contestant)
    }

    /// Checks and applies one vote. Leaves the table untouched on error.
    fn apply_vote(
        &mut self,
        voter_id: Uuid,
        contestant_id: Uuid,
        rules: VoteRules,
    ) -> Result<VoteOutcome> {
        if !self.rows.contains_key(&contestant_id) {
            return Err(ContestError::ContestantNotFound(contestant_id));
        }

        let vote_given = self.row_mut(voter_id)?.contestant.vote_given;
        if vote_given >= rules.vote_cap {
            return Err(ContestError::VoteCapExceeded {
                cap: rules.vote_cap,
            });
        }

        if rules.one_vote_per_contestant
            && self
                .votes
                .iter()
                .any(|v| v.voter_id == voter_id && v.contestant_id == contestant_id)
        {
            return Err(ContestError::DuplicateVote(contestant_id));
        }

        // Rows were checked above, so the lookups below cannot miss.
        let voter_vote_given = {
            let voter = self.row_mut(voter_id)?;
            voter.contestant.vote_given += 1;
            voter.contestant.vote_given
        };
        let contestant_total_votes = {
            let contestant = self.row_mut(contestant_id)?;
            contestant.contestant.total_votes += 1;
            contestant.contestant.total_votes
        };

        let record = VoteRecord {
            id: Uuid::new_v4(),
            voter_id,
            contestant_id,
            cast_at: truncate_micros(Utc::now()),
        };
        self.votes.push(record.clone());

        Ok(VoteOutcome {
            record,
            contestant_total_votes,
            voter_vote_given,
        })
    }

    fn remove(&mut self, id: Uuid) {
        if let Some(row) = self.rows.remove(&id) {
            self.by_email.remove(&row.contestant.email);
        }
    }

    fn ordered(&self) -> Vec<&Row> {
        let mut rows: Vec<&Row> = self.rows.values().collect();
        rows.sort_by(|a, b| rank_order(a, b));
        rows
    }
}

fn rank_order(a: &Row, b: &Row) -> Ordering {
    b.contestant
        .total_votes
        .cmp(&a.contestant.total_votes)
        .then(a.contestant.created_at.cmp(&b.contestant.created_at))
        .then(a.seq.cmp(&b.seq))
}

fn truncate_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_nanosecond(ts.nanosecond() / 1_000 * 1_000)
        .unwrap_or(ts)
}

fn matches(contestant: &Contestant, needle: &str) -> bool {
    contestant.name.to_lowercase().contains(needle)
        || contestant
            .handle
            .as_deref()
            .map(|h| h.to_lowercase().contains(needle))
            .unwrap_or(false)
}

fn apply_delta(counter: &mut i64, delta: i64) -> Result<i64> {
    let next = counter
        .checked_add(delta)
        .filter(|v| *v >= 0)
        .ok_or_else(|| ContestError::Validation("vote counters cannot go negative".to_string()))?;
    *counter = next;
    Ok(next)
}

/// In-process registry for tests and single-node development.
///
/// One mutex guards the whole table and is never held across an `.await`.
#[derive(Default)]
pub struct MemoryContestantStore {
    table: Mutex<Table>,
}

impl MemoryContestantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContestantStore for MemoryContestantStore {
    async fn get_by_email(&self, email: &str) -> Result<Option<Contestant>> {
        let table = self.table.lock();
        Ok(table
            .by_email
            .get(email)
            .and_then(|id| table.rows.get(id))
            .map(|row| row.contestant.clone()))
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Contestant>> {
        let table = self.table.lock();
        Ok(table.rows.get(&id).map(|row| row.contestant.clone()))
    }

    async fn create(&self, new: NewContestant) -> Result<Contestant> {
        self.table.lock().insert(new)
    }

    async fn increment_total_votes(&self, id: Uuid, delta: i64) -> Result<i64> {
        let mut table = self.table.lock();
        let row = table.row_mut(id)?;
        apply_delta(&mut row.contestant.total_votes, delta)
    }

    async fn increment_vote_given(&self, id: Uuid, delta: i64) -> Result<i64> {
        let mut table = self.table.lock();
        let row = table.row_mut(id)?;
        apply_delta(&mut row.contestant.vote_given, delta)
    }

    async fn record_vote(
        &self,
        voter_id: Uuid,
        contestant_id: Uuid,
        rules: VoteRules,
    ) -> Result<VoteOutcome> {
        self.table.lock().apply_vote(voter_id, contestant_id, rules)
    }

    async fn record_first_vote(
        &self,
        voter: NewContestant,
        contestant_id: Uuid,
        rules: VoteRules,
    ) -> Result<(Contestant, VoteOutcome)> {
        let mut table = self.table.lock();

        if !table.rows.contains_key(&contestant_id) {
            return Err(ContestError::ContestantNotFound(contestant_id));
        }

        let created = table.insert(voter)?;
        match table.apply_vote(created.id, contestant_id, rules) {
            Ok(outcome) => {
                let voter = table.row_mut(created.id)?.contestant.clone();
                Ok((voter, outcome))
            }
            Err(e) => {
                table.remove(created.id);
                Err(e)
            }
        }
    }

    async fn ranked(
        &self,
        filter: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<LeaderboardEntry>> {
        let needle = filter.map(str::to_lowercase);
        let table = self.table.lock();

        Ok(table
            .ordered()
            .into_iter()
            .enumerate()
            .filter(|(_, row)| match &needle {
                Some(n) => matches(&row.contestant, n),
                None => true,
            })
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|(position, row)| LeaderboardEntry {
                rank: position as i64 + 1,
                contestant: row.contestant.clone(),
            })
            .collect())
    }

    async fn count(&self, filter: Option<&str>) -> Result<i64> {
        let table = self.table.lock();
        let count = match filter.map(str::to_lowercase) {
            Some(needle) => table
                .rows
                .values()
                .filter(|row| matches(&row.contestant, &needle))
                .count(),
            None => table.rows.len(),
        };
        Ok(count as i64)
    }

    async fn votes_cast_by(&self, voter_id: Uuid) -> Result<Vec<VoteRecord>> {
        let table = self.table.lock();
        Ok(table
            .votes
            .iter()
            .filter(|v| v.voter_id == voter_id)
            .cloned()
            .collect())
    }
}
