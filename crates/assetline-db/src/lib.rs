//! Assetline persistence
//!
//! Postgres-backed coordinator store, durable message queue and session cache, plus
//! in-memory implementations of the same traits for tests and single-process runs.

pub mod coordinator;
pub mod queue;
pub mod session;

pub use coordinator::{CoordinatorStore, InMemoryCoordinatorStore, PgCoordinatorStore};
pub use queue::{InMemoryQueue, MessageQueue, PgMessageQueue, QueueMessage};
pub use session::{session_cache_key, InMemorySessionCache, PgSessionCache, SessionCache};

use anyhow::{Context, Result};
use sqlx::PgPool;

/// Apply the bundled migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")?;
    Ok(())
}
