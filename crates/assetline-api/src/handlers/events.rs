//! Upload event ingestion.

use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::json;
use std::sync::Arc;

use assetline_core::models::{UploadEventMessage, UPLOAD_COMPLETED_EVENT};
use assetline_core::AppError;

use crate::error::{HttpAppError, ValidatedJson};
use crate::state::AppState;

/// Enqueue an upload-completed event for the upload-event consumer.
#[tracing::instrument(skip(state, event), fields(key = %event.key))]
pub async fn publish_event(
    State(state): State<Arc<AppState>>,
    ValidatedJson(event): ValidatedJson<UploadEventMessage>,
) -> Result<(StatusCode, Json<serde_json::Value>), HttpAppError> {
    if event.event_type != UPLOAD_COMPLETED_EVENT {
        return Err(AppError::InvalidInput(format!(
            "Unsupported event type {}",
            event.event_type
        ))
        .into());
    }
    if event.key.trim().is_empty() {
        return Err(AppError::InvalidInput("Event key must not be empty".to_string()).into());
    }

    let body = serde_json::to_value(&event).map_err(|e| AppError::Internal(e.to_string()))?;
    let message_id = state
        .queue
        .send(&state.upload_event_queue, body)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to enqueue upload event");
            AppError::Queue(e.to_string())
        })?;

    tracing::info!(message_id = %message_id, "Upload event enqueued");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message_id": message_id })),
    ))
}
