//! Route configuration

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{coordinators, events, health};
use crate::state::AppState;

/// Control-plane bodies are small JSON documents.
const MAX_BODY_BYTES: usize = 1024 * 1024;
const HTTP_CONCURRENCY_LIMIT: usize = 1024;

pub fn setup_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/events", post(events::publish_event))
        .route(
            "/coordinators/{identity}/state",
            get(coordinators::get_state),
        )
        .route(
            "/coordinators/{identity}/process",
            post(coordinators::process),
        )
        .route(
            "/coordinators/{identity}/task-complete",
            post(coordinators::task_complete),
        )
        .layer(ConcurrencyLimitLayer::new(HTTP_CONCURRENCY_LIMIT))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
