pub mod api;

use crate::config::SharedConfig;
use crate::services::{Aggregator, AlertEngine, Collector, PriceStore};
use crate::worker::Scheduler;
use axum::routing::{delete, get, post, put};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PriceStore>,
    pub config: SharedConfig,
    pub collector: Arc<Collector>,
    pub aggregator: Arc<Aggregator>,
    pub alerts: Arc<AlertEngine>,
    pub scheduler: Arc<Scheduler>,
}

pub fn router(state: AppState) -> Router {
    // The dashboard is served from the same host (or localhost during
    // development); the API itself carries no credentials worth locking down.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/games", get(api::list_games).post(api::register_game))
        .route("/api/games/{id}", delete(api::delete_game))
        .route("/api/games/{id}/history-low", put(api::set_history_low))
        .route("/api/games/{id}/push-settings", put(api::set_push_settings))
        .route("/api/prices/{id}", get(api::get_prices))
        .route("/api/stats/{id}", get(api::get_stats))
        .route("/api/analysis/{id}", get(api::get_analysis))
        .route("/api/config", get(api::get_config).put(api::update_config))
        .route("/api/collect", post(api::collect_all))
        .route("/api/collect/{id}", post(api::collect_one))
        .route("/api/cleanup", post(api::cleanup))
        .route("/api/notify/test", post(api::notify_test))
        .route("/api/notify/daily-report", post(api::notify_daily_report))
        .route("/api/db-stats", get(api::db_stats))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the axum server; returns once the shutdown signal fires and
/// in-flight requests have drained.
pub async fn serve(state: AppState, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "Server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
