//! JSON-over-HTTP surface for the session API.

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/sessions/order", post(handlers::start_order))
        .route("/api/sessions/messaging", post(handlers::start_messaging))
        .route("/api/sessions/{id}", get(handlers::session_status))
        .route("/api/sessions/{id}/cancel", post(handlers::cancel_session))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
