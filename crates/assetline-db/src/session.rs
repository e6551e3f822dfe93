//! Upload session cache
//!
//! The session service stores upload context under `session:{sessionId}` when an
//! upload starts; the upload-event consumer reads it to fill in fields the completion
//! event omitted.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use assetline_core::models::SessionRecord;

pub fn session_cache_key(session_id: &str) -> String {
    format!("session:{}", session_id)
}

#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    async fn put(&self, session_id: &str, record: &SessionRecord) -> Result<()>;
}

#[derive(Clone)]
pub struct PgSessionCache {
    pool: PgPool,
}

impl PgSessionCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionCache for PgSessionCache {
    #[tracing::instrument(skip(self))]
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let row: Option<Json<SessionRecord>> = sqlx::query_scalar(
            r#"
            SELECT record FROM upload_sessions
            WHERE cache_key = $1
                AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(session_cache_key(session_id))
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read upload session")?;
        Ok(row.map(|Json(record)| record))
    }

    async fn put(&self, session_id: &str, record: &SessionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO upload_sessions (cache_key, record, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (cache_key) DO UPDATE
            SET record = EXCLUDED.record, updated_at = NOW()
            "#,
        )
        .bind(session_cache_key(session_id))
        .bind(Json(record))
        .execute(&self.pool)
        .await
        .context("Failed to write upload session")?;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemorySessionCache {
    entries: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl InMemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionCache for InMemorySessionCache {
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow::anyhow!("session cache poisoned"))?;
        Ok(entries.get(&session_cache_key(session_id)).cloned())
    }

    async fn put(&self, session_id: &str, record: &SessionRecord) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| anyhow::anyhow!("session cache poisoned"))?
            .insert(session_cache_key(session_id), record.clone());
        Ok(())
    }
}
