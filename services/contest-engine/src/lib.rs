pub mod config;
pub mod database;
pub mod enrollment;
pub mod errors;
pub mod handlers;
pub mod leaderboard;
pub mod ledger;
pub mod metrics;
pub mod models;
pub mod nats;
pub mod services;
pub mod store;
pub mod subscribers;

pub use config::Config;
pub use errors::{ContestError, ErrorKind, Result};
