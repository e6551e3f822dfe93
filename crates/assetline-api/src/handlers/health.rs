use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::state::AppState;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Liveness plus a database round trip when a pool is configured.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Some(pool) = &state.pool else {
        return (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "database": "not_configured" })),
        );
    };

    match tokio::time::timeout(CHECK_TIMEOUT, sqlx::query("SELECT 1").execute(pool)).await {
        Ok(Ok(_)) => (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "database": "healthy" })),
        ),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Database health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "database": format!("error: {}", e) })),
            )
        }
        Err(_) => {
            tracing::error!("Database health check timed out");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "database": "timeout" })),
            )
        }
    }
}
