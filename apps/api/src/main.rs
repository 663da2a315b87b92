mod auth;
mod config;
mod credits;
mod db;
mod documents;
mod errors;
mod llm_client;
mod models;
mod notify;
mod reports;
mod routes;
mod screening;
mod state;
mod storage;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::Config;
use crate::db::{create_pool, run_migrations};
use crate::llm_client::LlmClient;
use crate::notify::Notifier;
use crate::routes::build_router;
use crate::screening::cache::PgScoreCache;
use crate::screening::scorer::LlmCandidateScorer;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Screener API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL and apply pending migrations
    let db = create_pool(&config.database_url).await?;
    run_migrations(&db).await?;

    // Initialize Redis (per-user analysis lock)
    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized");

    // Initialize LLM client
    let llm = LlmClient::new(config.openai_api_key.clone())?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let scorer = Arc::new(LlmCandidateScorer::new(llm.clone()));
    let cache = Arc::new(PgScoreCache::new(db.clone(), config.analysis.cache_ttl_days));
    info!(
        "Analysis limits: concurrency={} max_cvs={} cache_ttl={}d",
        config.analysis.concurrency, config.analysis.max_cvs, config.analysis.cache_ttl_days
    );

    let notifier = Notifier::new(config.resend_api_key.clone(), config.email_from.clone())?;
    if !notifier.is_enabled() {
        info!("RESEND_API_KEY not set; completion emails are disabled");
    }

    // Build app state
    let state = AppState {
        db,
        redis,
        s3,
        llm,
        config: config.clone(),
        scorer,
        cache,
        notifier,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins to the web app's domain

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "screener-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
