//! Message handlers for the two pipeline queues.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use assetline_core::models::{
    ProcessingTaskMessage, TaskCompletion, UploadEventMessage, UPLOAD_COMPLETED_EVENT,
};
use assetline_db::QueueMessage;

use crate::context::QueueHandler;
use crate::dispatcher::DispatchContext;

/// Plans or resumes an upload and publishes its outstanding tasks.
pub struct UploadEventHandler {
    context: Arc<DispatchContext>,
}

impl UploadEventHandler {
    pub fn new(context: Arc<DispatchContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl QueueHandler for UploadEventHandler {
    #[tracing::instrument(skip(self, message), fields(message_id = %message.id))]
    async fn handle(self: Arc<Self>, message: &QueueMessage) -> Result<()> {
        let mut event: UploadEventMessage = serde_json::from_value(message.body.clone())
            .context("Malformed upload event payload")?;

        if event.event_type != UPLOAD_COMPLETED_EVENT {
            tracing::warn!(event_type = %event.event_type, "Ignoring unexpected event type");
            return Ok(());
        }

        if let Some(session_id) = event.session_id.clone().filter(|s| !s.is_empty()) {
            if let Some(session) = self
                .context
                .sessions
                .get(&session_id)
                .await
                .context("Failed to read upload session")?
            {
                event.enrich(session);
            }
        }

        let event = event.into_event(self.context.default_bucket.as_deref())?;
        let outcome = self.context.coordinator.process(&event).await?;

        let task_queue = &self.context.queues.processing_task_queue;
        for task in &outcome.tasks {
            let body = serde_json::to_value(task).context("Failed to encode task message")?;
            self.context
                .queue
                .send(task_queue, body)
                .await
                .with_context(|| format!("Failed to publish task {}", task.task))?;
        }

        tracing::info!(
            identity = %outcome.state.identity,
            published = outcome.tasks.len(),
            "Upload event handled"
        );
        Ok(())
    }
}

/// Runs one processing task and reports the outcome to the coordinator.
pub struct ProcessingTaskHandler {
    context: Arc<DispatchContext>,
}

impl ProcessingTaskHandler {
    pub fn new(context: Arc<DispatchContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl QueueHandler for ProcessingTaskHandler {
    #[tracing::instrument(skip(self, message), fields(message_id = %message.id, attempts = message.attempts))]
    async fn handle(self: Arc<Self>, message: &QueueMessage) -> Result<()> {
        let task: ProcessingTaskMessage = serde_json::from_value(message.body.clone())
            .context("Malformed processing task payload")?;
        let identity = task.identity();

        let (completion, failure) = match self.context.registry.run(&task).await {
            Ok(derived) => {
                tracing::info!(
                    identity = %identity,
                    task = %task.task,
                    derived_key = %derived.key,
                    "Task completed"
                );
                (TaskCompletion::succeeded(task.task.clone(), derived), None)
            }
            Err(e) => {
                let final_attempt = self.context.queue.is_final_attempt(message);
                tracing::warn!(
                    identity = %identity,
                    task = %task.task,
                    final_attempt,
                    error = %e,
                    "Task failed"
                );
                (
                    TaskCompletion::failed(task.task.clone(), e.to_string(), final_attempt),
                    Some(e),
                )
            }
        };

        self.context
            .coordinator
            .mark_task(&identity, &completion)
            .await
            .with_context(|| format!("Failed to report {} for {}", task.task, identity))?;

        match failure {
            Some(e) => Err(anyhow::Error::new(e).context(format!("Task {} failed", task.task))),
            None => Ok(()),
        }
    }
}
