//! Coordinator persistence
//!
//! Every mutation of a coordinator runs under an exclusive per-identity lock, so two
//! concurrent reports for the same upload are applied one after the other and never
//! interleave. The transitions themselves live in [`CoordinatorState`].

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use assetline_core::models::{
    CoordinatorState, MarkOutcome, ProcessOutcome, TaskCompletion, UploadEvent,
};
use assetline_core::AppError;

#[async_trait]
pub trait CoordinatorStore: Send + Sync {
    /// Plan-or-resume the coordinator for `event.identity()`.
    async fn process(&self, event: &UploadEvent) -> Result<ProcessOutcome, AppError>;

    /// Record one task outcome. Fails with `NotFound` when the identity was never planned.
    async fn mark_task(
        &self,
        identity: &str,
        completion: &TaskCompletion,
    ) -> Result<(CoordinatorState, MarkOutcome), AppError>;

    async fn get(&self, identity: &str) -> Result<Option<CoordinatorState>, AppError>;

    /// Stamp `notifiedAt` after the completion notifier succeeded.
    async fn record_notified(&self, identity: &str) -> Result<(), AppError>;

    /// Drop the notification claim taken by `mark_task` after the notifier failed.
    async fn release_notification(&self, identity: &str) -> Result<(), AppError>;
}

fn not_found(identity: &str) -> AppError {
    AppError::NotFound(format!("No coordinator state for {}", identity))
}

#[derive(Clone)]
pub struct PgCoordinatorStore {
    pool: PgPool,
}

impl PgCoordinatorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Begin a transaction holding the identity's advisory lock until commit.
    async fn lock(&self, identity: &str) -> Result<Transaction<'static, Postgres>, AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(identity)
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn load(
        tx: &mut Transaction<'static, Postgres>,
        identity: &str,
    ) -> Result<Option<CoordinatorState>, AppError> {
        let row: Option<Json<CoordinatorState>> = sqlx::query_scalar(
            r#"
            SELECT state FROM upload_coordinators WHERE identity = $1
            "#,
        )
        .bind(identity)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.map(|Json(state)| state))
    }

    async fn save(
        tx: &mut Transaction<'static, Postgres>,
        state: &CoordinatorState,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO upload_coordinators (identity, status, state, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (identity) DO UPDATE
            SET status = EXCLUDED.status,
                state = EXCLUDED.state,
                updated_at = NOW()
            "#,
        )
        .bind(&state.identity)
        .bind(state.status.to_string())
        .bind(Json(state))
        .bind(state.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CoordinatorStore for PgCoordinatorStore {
    #[tracing::instrument(skip(self, event), fields(identity = %event.identity()))]
    async fn process(&self, event: &UploadEvent) -> Result<ProcessOutcome, AppError> {
        let identity = event.identity();
        let mut tx = self.lock(&identity).await?;

        let existing = Self::load(&mut tx, &identity).await?;
        let outcome = CoordinatorState::process(existing, event, Utc::now());
        Self::save(&mut tx, &outcome.state).await?;
        tx.commit().await?;

        tracing::debug!(
            created = outcome.created,
            emitted = outcome.tasks.len(),
            status = %outcome.state.status,
            "Coordinator processed upload event"
        );
        Ok(outcome)
    }

    #[tracing::instrument(skip(self, completion), fields(task_id = %completion.task.id()))]
    async fn mark_task(
        &self,
        identity: &str,
        completion: &TaskCompletion,
    ) -> Result<(CoordinatorState, MarkOutcome), AppError> {
        let mut tx = self.lock(identity).await?;

        let mut state = Self::load(&mut tx, identity)
            .await?
            .ok_or_else(|| not_found(identity))?;
        let outcome = state.mark_task(completion, Utc::now());
        if outcome.applied {
            Self::save(&mut tx, &state).await?;
        }
        tx.commit().await?;

        Ok((state, outcome))
    }

    async fn get(&self, identity: &str) -> Result<Option<CoordinatorState>, AppError> {
        let row: Option<Json<CoordinatorState>> = sqlx::query_scalar(
            r#"
            SELECT state FROM upload_coordinators WHERE identity = $1
            "#,
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|Json(state)| state))
    }

    #[tracing::instrument(skip(self))]
    async fn record_notified(&self, identity: &str) -> Result<(), AppError> {
        let mut tx = self.lock(identity).await?;

        let mut state = Self::load(&mut tx, identity)
            .await?
            .ok_or_else(|| not_found(identity))?;
        state.record_notified(Utc::now());
        Self::save(&mut tx, &state).await?;
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn release_notification(&self, identity: &str) -> Result<(), AppError> {
        let mut tx = self.lock(identity).await?;

        let mut state = Self::load(&mut tx, identity)
            .await?
            .ok_or_else(|| not_found(identity))?;
        state.release_notification();
        Self::save(&mut tx, &state).await?;
        tx.commit().await?;
        Ok(())
    }
}

type Slot = Arc<tokio::sync::Mutex<Option<CoordinatorState>>>;

/// Coordinator store kept in process memory, one async mutex per identity.
#[derive(Clone, Default)]
pub struct InMemoryCoordinatorStore {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl InMemoryCoordinatorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, identity: &str) -> Result<Slot, AppError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| AppError::Internal("coordinator slot map poisoned".to_string()))?;
        Ok(slots
            .entry(identity.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None)))
            .clone())
    }
}

#[async_trait]
impl CoordinatorStore for InMemoryCoordinatorStore {
    async fn process(&self, event: &UploadEvent) -> Result<ProcessOutcome, AppError> {
        let slot = self.slot(&event.identity())?;
        let mut guard = slot.lock().await;

        let outcome = CoordinatorState::process(guard.take(), event, Utc::now());
        *guard = Some(outcome.state.clone());
        Ok(outcome)
    }

    async fn mark_task(
        &self,
        identity: &str,
        completion: &TaskCompletion,
    ) -> Result<(CoordinatorState, MarkOutcome), AppError> {
        let slot = self.slot(identity)?;
        let mut guard = slot.lock().await;

        let state = guard.as_mut().ok_or_else(|| not_found(identity))?;
        let outcome = state.mark_task(completion, Utc::now());
        Ok((state.clone(), outcome))
    }

    async fn get(&self, identity: &str) -> Result<Option<CoordinatorState>, AppError> {
        let slot = self.slot(identity)?;
        let guard = slot.lock().await;
        Ok(guard.clone())
    }

    async fn record_notified(&self, identity: &str) -> Result<(), AppError> {
        let slot = self.slot(identity)?;
        let mut guard = slot.lock().await;

        let state = guard.as_mut().ok_or_else(|| not_found(identity))?;
        state.record_notified(Utc::now());
        Ok(())
    }

    async fn release_notification(&self, identity: &str) -> Result<(), AppError> {
        let slot = self.slot(identity)?;
        let mut guard = slot.lock().await;

        let state = guard.as_mut().ok_or_else(|| not_found(identity))?;
        state.release_notification();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetline_core::models::{AggregateStatus, DerivedAssetRecord, ProcessingTask, TaskKind};
    use serde_json::json;

    fn event() -> UploadEvent {
        UploadEvent {
            session_id: Some("s-1".into()),
            upload_id: None,
            owner_id: None,
            key: "docs/readme.pdf".into(),
            bucket: "uploads".into(),
            content_type: Some("application/pdf".into()),
            metadata: None,
        }
    }

    fn success(task: ProcessingTask, kind: TaskKind, key: &str) -> TaskCompletion {
        TaskCompletion::succeeded(task, DerivedAssetRecord::new(kind, key, key, json!({})))
    }

    #[tokio::test]
    async fn mark_task_on_unknown_identity_is_not_found() {
        let store = InMemoryCoordinatorStore::new();
        let err = store
            .mark_task(
                "missing",
                &success(ProcessingTask::SafetyScan, TaskKind::SafetyScan, "k"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn concurrent_marks_are_all_applied() {
        let store = InMemoryCoordinatorStore::new();
        let outcome = store.process(&event()).await.unwrap();
        assert_eq!(outcome.tasks.len(), 3);

        let completions = vec![
            success(
                ProcessingTask::DocumentExtractText,
                TaskKind::DocumentExtractText,
                "docs/readme__text.txt",
            ),
            success(
                ProcessingTask::DocumentPreview,
                TaskKind::DocumentPreview,
                "docs/readme__preview.txt",
            ),
            success(
                ProcessingTask::SafetyScan,
                TaskKind::SafetyScan,
                "docs/readme__safety.json",
            ),
        ];

        let handles: Vec<_> = completions
            .into_iter()
            .map(|completion| {
                let store = store.clone();
                tokio::spawn(async move { store.mark_task("s-1", &completion).await })
            })
            .collect();

        let mut notify_count = 0;
        for handle in handles {
            let (_, outcome) = handle.await.unwrap().unwrap();
            if outcome.should_notify {
                notify_count += 1;
            }
        }
        assert_eq!(notify_count, 1);

        let state = store.get("s-1").await.unwrap().unwrap();
        assert_eq!(state.status, AggregateStatus::Completed);
        assert_eq!(state.derived_assets.len(), 3);
    }

    #[tokio::test]
    async fn record_notified_suppresses_later_notifications() {
        let store = InMemoryCoordinatorStore::new();
        store.process(&event()).await.unwrap();
        store.record_notified("s-1").await.unwrap();

        let state = store.get("s-1").await.unwrap().unwrap();
        assert!(state.notified_at.is_some());
        assert!(store.get("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn released_claim_allows_another_notification() {
        let store = InMemoryCoordinatorStore::new();
        store.process(&event()).await.unwrap();
        let completions = [
            success(
                ProcessingTask::DocumentExtractText,
                TaskKind::DocumentExtractText,
                "docs/readme__text.txt",
            ),
            success(
                ProcessingTask::DocumentPreview,
                TaskKind::DocumentPreview,
                "docs/readme__preview.txt",
            ),
            success(
                ProcessingTask::SafetyScan,
                TaskKind::SafetyScan,
                "docs/readme__safety.json",
            ),
        ];
        let mut claimed = 0;
        for completion in &completions {
            let (_, outcome) = store.mark_task("s-1", completion).await.unwrap();
            claimed += outcome.should_notify as usize;
        }
        assert_eq!(claimed, 1);

        let (_, duplicate) = store.mark_task("s-1", &completions[2]).await.unwrap();
        assert!(!duplicate.should_notify);

        store.release_notification("s-1").await.unwrap();
        let (_, retried) = store.mark_task("s-1", &completions[2]).await.unwrap();
        assert!(retried.should_notify);
    }
}
