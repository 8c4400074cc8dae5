//! Registry tests against a live Postgres.
//!
//! Run with `DATABASE_URL=postgres://... cargo test -- --ignored`.

mod common;

use common::test_config;
use contest_engine::config::ContestConfig;
use contest_engine::database::{Database, PgContestantStore};
use contest_engine::models::{EnrollRequest, NewContestant, VoteRules};
use contest_engine::services::ContestService;
use contest_engine::store::ContestantStore;
use contest_engine::subscribers::{PgSubscriberDirectory, SubscriberDirectory};
use contest_engine::ContestError;
use futures_util::future::join_all;
use std::sync::Arc;
use uuid::Uuid;

async fn database() -> Arc<Database> {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let db = Database::new(&url, 16, 1).await.expect("connect");
    db.run_migrations().await.expect("migrate");
    Arc::new(db)
}

/// Unique per run so tests can share one database.
fn email(tag: &str) -> String {
    format!("{}-{}@contest.test", tag, Uuid::new_v4().simple())
}

fn entry(email: &str, name: &str) -> NewContestant {
    NewContestant {
        email: email.to_string(),
        name: name.to_string(),
        handle: None,
    }
}

async fn subscribe(db: &Database, email: &str) {
    sqlx::query("INSERT INTO subscribers (email) VALUES ($1) ON CONFLICT DO NOTHING")
        .bind(email)
        .execute(db.pool())
        .await
        .expect("insert subscriber");
}

#[tokio::test]
#[ignore]
async fn test_duplicate_email_is_already_exists() {
    let db = database().await;
    let store = PgContestantStore::new(db);
    let address = email("dup");

    store.create(entry(&address, "First")).await.unwrap();
    let err = store.create(entry(&address, "Second")).await.unwrap_err();
    assert!(matches!(err, ContestError::AlreadyExists(_)));
}

#[tokio::test]
#[ignore]
async fn test_counters_never_go_negative() {
    let db = database().await;
    let store = PgContestantStore::new(db);
    let c = store.create(entry(&email("neg"), "Negative")).await.unwrap();

    assert_eq!(store.increment_total_votes(c.id, 2).await.unwrap(), 2);
    assert!(store.increment_total_votes(c.id, -3).await.is_err());
    assert_eq!(store.get_by_id(c.id).await.unwrap().unwrap().total_votes, 2);
}

#[tokio::test]
#[ignore]
async fn test_record_vote_enforces_cap_and_duplicates() {
    let db = database().await;
    let store = PgContestantStore::new(db);
    let voter = store.create(entry(&email("voter"), "Voter")).await.unwrap();
    let a = store.create(entry(&email("a"), "A")).await.unwrap();
    let b = store.create(entry(&email("b"), "B")).await.unwrap();

    let strict = VoteRules {
        vote_cap: 2,
        one_vote_per_contestant: true,
    };

    let outcome = store.record_vote(voter.id, a.id, strict).await.unwrap();
    assert_eq!(outcome.contestant_total_votes, 1);
    assert_eq!(outcome.voter_vote_given, 1);

    let err = store.record_vote(voter.id, a.id, strict).await.unwrap_err();
    assert!(matches!(err, ContestError::DuplicateVote(_)));

    store.record_vote(voter.id, b.id, strict).await.unwrap();
    let err = store.record_vote(voter.id, b.id, VoteRules {
        vote_cap: 2,
        one_vote_per_contestant: false,
    })
    .await
    .unwrap_err();
    assert!(matches!(err, ContestError::VoteCapExceeded { cap: 2 }));

    assert_eq!(store.votes_cast_by(voter.id).await.unwrap().len(), 2);
    assert_eq!(store.get_by_id(b.id).await.unwrap().unwrap().total_votes, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore]
async fn test_concurrent_votes_respect_cap() {
    let db = database().await;
    let store: Arc<dyn ContestantStore> = Arc::new(PgContestantStore::new(db));
    let voter = store.create(entry(&email("racer"), "Racer")).await.unwrap();
    let target = store.create(entry(&email("target"), "Target")).await.unwrap();

    let (voter_id, target_id) = (voter.id, target.id);
    let rules = VoteRules {
        vote_cap: 3,
        one_vote_per_contestant: false,
    };
    let tasks = (0..20).map(|_| {
        let store = store.clone();
        tokio::spawn(async move { store.record_vote(voter_id, target_id, rules).await })
    });
    let successes = join_all(tasks)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();

    assert_eq!(successes, 3);
    assert_eq!(store.get_by_id(voter.id).await.unwrap().unwrap().vote_given, 3);
    assert_eq!(store.get_by_id(target.id).await.unwrap().unwrap().total_votes, 3);
}

#[tokio::test]
#[ignore]
async fn test_filtered_rank_is_global() {
    let db = database().await;
    let store = PgContestantStore::new(db);
    let marker = Uuid::new_v4().simple().to_string();
    let needle = format!("{}_x%", &marker[..8]);

    let literal = store
        .create(entry(&email("lit"), &format!("{}_x% Literal", &marker[..8])))
        .await
        .unwrap();
    store
        .create(entry(&email("wild"), &format!("{}_xyz", &marker[..8])))
        .await
        .unwrap();

    let found = store.ranked(Some(&needle), 0, 10).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].contestant.id, literal.id);
    assert_eq!(store.count(Some(&needle)).await.unwrap(), 1);

    let all = store.ranked(None, 0, i64::MAX).await.unwrap();
    let position = all
        .iter()
        .find(|e| e.contestant.id == literal.id)
        .map(|e| e.rank)
        .unwrap();
    assert_eq!(found[0].rank, position);
}

#[tokio::test]
#[ignore]
async fn test_subscriber_directory_and_enrollment() {
    let db = database().await;
    let address = email("sub");
    subscribe(&db, &address).await;

    let subscribers = Arc::new(PgSubscriberDirectory::new(db.clone()));
    assert!(subscribers.is_subscriber(&address).await.unwrap());
    assert!(!subscribers.is_subscriber(&email("nobody")).await.unwrap());

    let service = ContestService::new(
        &test_config(ContestConfig::default()),
        Arc::new(PgContestantStore::new(db)),
        subscribers,
        None,
        None,
    );

    let created = service
        .enroll(EnrollRequest {
            email: address.to_uppercase(),
            name: "Postgres Entry".to_string(),
            handle: Some("@pg".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(created.email, address);
    assert_eq!(created.handle.as_deref(), Some("pg"));
    assert_eq!(service.get_contestant(created.id).await.unwrap(), created);
}

#[tokio::test]
#[ignore]
async fn test_first_vote_rolls_back_new_voter() {
    let db = database().await;
    let store = PgContestantStore::new(db);
    let target = store.create(entry(&email("target"), "Target")).await.unwrap();
    let rules = VoteRules {
        vote_cap: 3,
        one_vote_per_contestant: false,
    };

    let newcomer = email("newcomer");
    let err = store
        .record_first_vote(entry(&newcomer, "newcomer"), Uuid::new_v4(), rules)
        .await
        .unwrap_err();
    assert!(matches!(err, ContestError::ContestantNotFound(_)));
    assert!(store.get_by_email(&newcomer).await.unwrap().is_none());

    let (voter, outcome) = store
        .record_first_vote(entry(&newcomer, "newcomer"), target.id, rules)
        .await
        .unwrap();
    assert_eq!(voter.vote_given, 1);
    assert_eq!(outcome.contestant_total_votes, 1);
    assert_eq!(store.votes_cast_by(voter.id).await.unwrap().len(), 1);

    let err = store
        .record_first_vote(entry(&newcomer, "again"), target.id, rules)
        .await
        .unwrap_err();
    assert!(matches!(err, ContestError::AlreadyExists(_)));
    assert_eq!(store.get_by_id(target.id).await.unwrap().unwrap().total_votes, 1);
}

#[tokio::test]
#[ignore]
async fn test_subscriber_lookup_uses_lowercase_index() {
    let db = database().await;
    let address = email("Mixed");
    subscribe(&db, &address.to_uppercase()).await;

    let indexed: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM pg_indexes WHERE indexname = 'subscribers_email_lower_idx')",
    )
    .fetch_one(db.pool())
    .await
    .unwrap();
    assert!(indexed);

    let subscribers = PgSubscriberDirectory::new(db);
    assert!(subscribers.is_subscriber(&address.to_lowercase()).await.unwrap());
}
