use axum::http::HeaderValue;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod constants;
mod db;
mod error;
mod models;
mod services;
mod tokenomics;
mod utils;

use config::Config;
use constants::API_VERSION;
use db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cfl_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!("Starting CFL Backend Server");
    tracing::info!("Environment: {}", config.environment);
    tracing::info!("API Version: {}", API_VERSION);
    tracing::info!(
        "Platform fee: {}%",
        tokenomics::bps_to_percent(config.platform_fee_bps)
    );

    // Initialize database
    let db = Database::new(&config).await?;

    tracing::info!("Running database migrations...");
    db.run_migrations().await?;

    let app_state = api::AppState {
        db: db.clone(),
        config: config.clone(),
    };

    let app = build_router(app_state);

    // Start background services
    tokio::spawn(services::start_background_services(
        db.clone(),
        config.clone(),
    ));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: api::AppState) -> Router {
    let cors = cors_from_config(&state.config);

    Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        // Lobbies
        .route("/api/v1/lobbies", get(api::lobbies::list_lobbies))
        .route("/api/v1/lobbies/{id}", get(api::lobbies::get_lobby))
        .route("/api/v1/lobbies/{id}/join", post(api::lobbies::join_lobby))
        .route(
            "/api/v1/lobbies/{id}/prizes",
            get(api::lobbies::get_lobby_prizes),
        )
        .route(
            "/api/v1/lobbies/{id}/prizes/{rank}",
            get(api::lobbies::get_lobby_prize_for_rank),
        )
        // Prize calculator
        .route("/api/v1/prizes/preview", get(api::prizes::preview))
        // Balances
        .route("/api/v1/balance/{address}", get(api::balance::get_balance))
        // Admin
        .route("/api/v1/admin/lobbies", post(api::admin::create_lobby))
        .route(
            "/api/v1/admin/lobbies/{id}/settle",
            post(api::admin::settle_lobby),
        )
        .route(
            "/api/v1/admin/lobbies/{id}/close",
            post(api::admin::close_lobby),
        )
        .route(
            "/api/v1/admin/lobbies/{id}/scores",
            put(api::admin::record_scores),
        )
        .route("/api/v1/admin/deposits", post(api::admin::credit_deposit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_from_config(config: &Config) -> CorsLayer {
    let raw = config.cors_allowed_origins.trim();
    if raw.is_empty() || raw == "*" {
        return CorsLayer::very_permissive();
    }

    let allowed: Vec<HeaderValue> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();

    if allowed.is_empty() {
        tracing::warn!("No valid CORS origins parsed; falling back to permissive");
        return CorsLayer::very_permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
