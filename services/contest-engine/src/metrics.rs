use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    pub static ref VOTES_CAST: IntCounter = register_int_counter!(
        "contest_votes_cast_total",
        "Total votes committed"
    )
    .expect("metric can be created");

    pub static ref VOTES_REJECTED: IntCounterVec = register_int_counter_vec!(
        "contest_votes_rejected_total",
        "Votes refused, by reason",
        &["reason"]
    )
    .expect("metric can be created");

    pub static ref VOTE_DURATION: Histogram = register_histogram!(
        "contest_vote_duration_seconds",
        "Time to resolve and commit a vote",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    )
    .expect("metric can be created");

    pub static ref ENROLLMENTS: IntCounter = register_int_counter!(
        "contest_enrollments_total",
        "Total contestants enrolled"
    )
    .expect("metric can be created");

    pub static ref LEADERBOARD_QUERIES: IntCounter = register_int_counter!(
        "contest_leaderboard_queries_total",
        "Total leaderboard queries"
    )
    .expect("metric can be created");

    pub static ref CACHE_HITS: IntCounter = register_int_counter!(
        "contest_leaderboard_cache_hits_total",
        "Leaderboard pages served from cache"
    )
    .expect("metric can be created");

    pub static ref CACHE_MISSES: IntCounter = register_int_counter!(
        "contest_leaderboard_cache_misses_total",
        "Leaderboard pages read from the registry"
    )
    .expect("metric can be created");
}

/// Generate metrics output in Prometheus text format
pub fn metrics_handler() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
