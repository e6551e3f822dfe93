use serde::{Deserialize, Serialize};

use super::asset::DerivedAssetRecord;
use super::event::coordinator_identity;
use super::task::ProcessingTask;

/// Message type carried by every task message.
pub const PROCESSING_TASK_MESSAGE: &str = "processing.task";

/// Self-contained unit of work published to the task queue.
///
/// Carries the full upload context so processors never need to read coordinator state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingTaskMessage {
    #[serde(rename = "type", default = "default_message_type")]
    pub message_type: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub upload_id: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    pub key: String,
    pub bucket: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub task: ProcessingTask,
}

fn default_message_type() -> String {
    PROCESSING_TASK_MESSAGE.to_string()
}

impl ProcessingTaskMessage {
    pub fn identity(&self) -> String {
        coordinator_identity(
            self.session_id.as_deref(),
            self.upload_id.as_deref(),
            &self.key,
        )
    }

    /// `metadata.processing.text_like`, or a `text/*` content type.
    pub fn is_text_like(&self) -> bool {
        let flagged = self
            .metadata
            .pointer("/processing/text_like")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        flagged
            || self
                .content_type
                .as_deref()
                .map(|ct| ct.to_ascii_lowercase().starts_with("text/"))
                .unwrap_or(false)
    }
}

/// Outcome of one task attempt, reported back to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCompletion {
    pub task: ProcessingTask,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived: Option<DerivedAssetRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the failing delivery was the last one the queue will make.
    #[serde(default)]
    pub final_attempt: bool,
}

impl TaskCompletion {
    pub fn succeeded(task: ProcessingTask, derived: DerivedAssetRecord) -> Self {
        Self {
            task,
            derived: Some(derived),
            error: None,
            final_attempt: false,
        }
    }

    pub fn failed(task: ProcessingTask, error: impl Into<String>, final_attempt: bool) -> Self {
        Self {
            task,
            derived: None,
            error: Some(error.into()),
            final_attempt,
        }
    }
}
