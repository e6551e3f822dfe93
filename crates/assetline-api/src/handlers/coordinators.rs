//! Coordinator control surface.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use assetline_core::models::{
    CoordinatorState, ProcessingTaskMessage, TaskCompletion, UploadEvent,
};
use assetline_core::AppError;

use crate::error::{HttpAppError, ValidatedJson};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub event: UploadEvent,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub state: CoordinatorState,
    pub tasks: Vec<ProcessingTaskMessage>,
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub state: CoordinatorState,
}

/// Current state of one coordinator.
#[tracing::instrument(skip(state))]
pub async fn get_state(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
) -> Result<Json<CoordinatorState>, HttpAppError> {
    match state.coordinator.get(&identity).await? {
        Some(coordinator) => Ok(Json(coordinator)),
        None => Err(AppError::NotFound(format!("No coordinator state for {}", identity)).into()),
    }
}

/// Plan-or-resume. The returned tasks are not published; callers own delivery.
#[tracing::instrument(skip(state, request))]
pub async fn process(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
    ValidatedJson(request): ValidatedJson<ProcessRequest>,
) -> Result<Json<ProcessResponse>, HttpAppError> {
    let event_identity = request.event.identity();
    if event_identity != identity {
        return Err(AppError::InvalidInput(format!(
            "Event identity {} does not match coordinator {}",
            event_identity, identity
        ))
        .into());
    }

    let outcome = state.coordinator.process(&request.event).await?;
    Ok(Json(ProcessResponse {
        state: outcome.state,
        tasks: outcome.tasks,
    }))
}

#[tracing::instrument(skip(state, completion), fields(task = %completion.task))]
pub async fn task_complete(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
    ValidatedJson(completion): ValidatedJson<TaskCompletion>,
) -> Result<Json<StateResponse>, HttpAppError> {
    let coordinator = state.coordinator.mark_task(&identity, &completion).await?;
    Ok(Json(StateResponse { state: coordinator }))
}
