//! Trellis server library logic.

pub mod api_federation;
pub mod config;

use axum::{
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use trellis_db::DbPool;
use trellis_events::{EventConfig, FormatRegistry};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Room version and event format dispatch.
    pub registry: Arc<FormatRegistry>,
    /// Passed to every event built or loaded by this server.
    pub event_config: EventConfig,
    /// The name this server answers federation requests as.
    pub server_name: String,
    /// Room version assumed for submitted PDUs that do not name one.
    pub default_room_version: String,
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/_matrix/federation/v1/event/{event_id}",
            get(api_federation::get_event_handler),
        )
        .route(
            "/_matrix/federation/v1/pdu",
            post(api_federation::submit_pdu_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
