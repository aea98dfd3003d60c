use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Scan endpoints
        .route("/api/scan", get(handlers::quick_scan))
        .route("/api/scanall", post(handlers::scan_all))
        .route("/api/cron-scan", get(handlers::cron_scan))
        // Status endpoints
        .route("/api/status", get(handlers::get_status))
        .route("/api/results", get(handlers::get_results))
        .route("/api/health", get(handlers::health))
        // Telegram webhook
        .route("/api/webhook", post(handlers::webhook))
        // Add state and CORS
        .with_state(state)
        .layer(cors)
}
