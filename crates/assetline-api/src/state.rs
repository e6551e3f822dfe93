//! Application state shared by every handler.

use sqlx::PgPool;
use std::sync::Arc;

use assetline_db::MessageQueue;
use assetline_worker::CoordinatorService;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: CoordinatorService,
    pub queue: Arc<dyn MessageQueue>,
    /// Destination of `POST /events`.
    pub upload_event_queue: String,
    /// Checked by `/health` when present.
    pub pool: Option<PgPool>,
}
