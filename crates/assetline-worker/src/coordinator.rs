//! Coordinator service: store transitions plus the completion side effect.

use chrono::Utc;
use std::sync::Arc;

use assetline_core::models::{CoordinatorState, MarkOutcome, ProcessOutcome, TaskCompletion, UploadEvent};
use assetline_core::AppError;
use assetline_db::CoordinatorStore;
use assetline_infra::{CompletionNotifier, NotifyOutcome};

#[derive(Clone)]
pub struct CoordinatorService {
    store: Arc<dyn CoordinatorStore>,
    notifier: Arc<dyn CompletionNotifier>,
}

impl CoordinatorService {
    pub fn new(store: Arc<dyn CoordinatorStore>, notifier: Arc<dyn CompletionNotifier>) -> Self {
        Self { store, notifier }
    }

    #[tracing::instrument(skip(self, event), fields(identity = %event.identity(), key = %event.key))]
    pub async fn process(&self, event: &UploadEvent) -> Result<ProcessOutcome, AppError> {
        let outcome = self.store.process(event).await?;
        tracing::info!(
            created = outcome.created,
            status = ?outcome.state.status,
            emitted = outcome.tasks.len(),
            "Coordinator processed upload event"
        );
        Ok(outcome)
    }

    /// Apply one task outcome. The store hands the notification claim to exactly one
    /// caller once every task is completed; that caller runs the notifier and either
    /// stamps `notifiedAt` or releases the claim for a later report to retry.
    #[tracing::instrument(skip(self, completion), fields(task = %completion.task))]
    pub async fn mark_task(
        &self,
        identity: &str,
        completion: &TaskCompletion,
    ) -> Result<CoordinatorState, AppError> {
        let (mut state, outcome) = self.store.mark_task(identity, completion).await?;
        let MarkOutcome {
            applied,
            should_notify,
        } = outcome;

        if !applied {
            tracing::warn!("Task is not part of the upload plan; ignored");
            return Ok(state);
        }

        tracing::debug!(status = ?state.status, failed = completion.error.is_some(), "Task outcome recorded");

        if should_notify {
            match self.notifier.notify(&state).await {
                Ok(outcome) => {
                    if let NotifyOutcome::Skipped(reason) = outcome {
                        tracing::info!(reason, "Completion notification skipped");
                    }
                    self.store.record_notified(identity).await?;
                    state.record_notified(Utc::now());
                }
                Err(e) => {
                    tracing::error!(error = %e, "Completion notification failed");
                    self.store.release_notification(identity).await?;
                    state.release_notification();
                }
            }
        }

        Ok(state)
    }

    pub async fn get(&self, identity: &str) -> Result<Option<CoordinatorState>, AppError> {
        self.store.get(identity).await
    }
}
