use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use contest_engine::{
    config::{Config, StorageBackend},
    database::{Database, PgContestantStore},
    handlers,
    nats::NatsProducer,
    services::ContestService,
    store::{ContestantStore, MemoryContestantStore},
    subscribers::{PgSubscriberDirectory, StaticSubscriberDirectory, SubscriberDirectory},
};
use dotenv::dotenv;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    info!(
        "Starting Contest Engine on port {} (vote cap {}, voter policy {:?})",
        config.server.port, config.contest.vote_cap, config.contest.voter_policy
    );

    let (store, subscribers): (Arc<dyn ContestantStore>, Arc<dyn SubscriberDirectory>) =
        match config.database.backend {
            StorageBackend::Postgres => {
                let db = Arc::new(
                    Database::new(
                        &config.database.url,
                        config.database.max_connections,
                        config.database.min_connections,
                    )
                    .await
                    .context("Failed to connect to database")?,
                );
                db.run_migrations().await?;
                db.health_check().await?;
                info!("Database health check passed");

                (
                    Arc::new(PgContestantStore::new(db.clone())) as Arc<dyn ContestantStore>,
                    Arc::new(PgSubscriberDirectory::new(db)) as Arc<dyn SubscriberDirectory>,
                )
            }
            StorageBackend::Memory => {
                warn!("Using in-memory storage; contest state is lost on restart");
                let subscribers = std::env::var("CONTEST_ENGINE_SUBSCRIBERS").unwrap_or_default();
                (
                    Arc::new(MemoryContestantStore::new()) as Arc<dyn ContestantStore>,
                    Arc::new(StaticSubscriberDirectory::new(
                        subscribers.split(',').filter(|e| !e.trim().is_empty()),
                    )) as Arc<dyn SubscriberDirectory>,
                )
            }
        };

    let redis = if config.redis.url.is_empty() {
        None
    } else {
        let client = redis::Client::open(config.redis.url.clone())
            .context("Failed to create Redis client")?;
        Some(
            ConnectionManager::new(client)
                .await
                .context("Failed to connect to Redis")?,
        )
    };

    let nats = if config.nats.url.is_empty() {
        None
    } else {
        Some(Arc::new(
            NatsProducer::new(&config.nats.url, &config.nats.topic_prefix).await?,
        ))
    };

    let service = Arc::new(ContestService::new(&config, store, subscribers, nats, redis));

    let server_config = config.server.clone();
    info!(
        "Starting HTTP server on {}:{}",
        server_config.host, server_config.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .app_data(web::Data::new(service.clone()))
            .configure(handlers::configure_routes)
    })
    .workers(server_config.workers)
    .bind((server_config.host, server_config.port))?
    .run()
    .await?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false);

    if std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false) {
        builder.json().init();
    } else {
        builder.init();
    }
}
