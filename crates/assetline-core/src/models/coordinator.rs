//! Per-upload coordinator state and its two transitions.
//!
//! The functions here are pure: persistence and the one-mutation-per-identity rule are
//! provided by the coordinator store, which calls [`CoordinatorState::process`] and
//! [`CoordinatorState::mark_task`] while holding the identity's lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

use super::asset::DerivedAssetRecord;
use super::event::UploadEvent;
use super::message::{ProcessingTaskMessage, TaskCompletion, PROCESSING_TASK_MESSAGE};
use super::task::ProcessingTask;
use crate::planner::build_tasks;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Upload-level status. `Failed` marks the most recent task report as an error, or a
/// task whose retries are exhausted. Only the first kind recovers on a later success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateStatus {
    Queued,
    Skipped,
    Running,
    Completed,
    Failed,
}

impl Display for AggregateStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AggregateStatus::Queued => write!(f, "queued"),
            AggregateStatus::Skipped => write!(f, "skipped"),
            AggregateStatus::Running => write!(f, "running"),
            AggregateStatus::Completed => write!(f, "completed"),
            AggregateStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEntry {
    pub task: ProcessingTask,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of outcomes reported for this task.
    #[serde(default)]
    pub attempts: u32,
    /// The queue gave up redelivering after this failure.
    #[serde(default)]
    pub exhausted: bool,
    /// Key of the derived asset this task last produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TaskEntry {
    fn pending(task: ProcessingTask) -> Self {
        Self {
            task,
            status: TaskStatus::Pending,
            error: None,
            attempts: 0,
            exhausted: false,
            derived_key: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorState {
    pub identity: String,
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
    pub metadata: Value,
    pub tasks: BTreeMap<String, TaskEntry>,
    #[serde(default)]
    pub derived_assets: Vec<DerivedAssetRecord>,
    pub status: AggregateStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notified_at: Option<DateTime<Utc>>,
    /// Set while one caller owns the completion notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_claimed_at: Option<DateTime<Utc>>,
}

/// Result of [`CoordinatorState::process`]; serialized as `{state, tasks}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub state: CoordinatorState,
    pub tasks: Vec<ProcessingTaskMessage>,
    /// The plan was created by this call.
    #[serde(default)]
    pub created: bool,
}

/// Result of [`CoordinatorState::mark_task`].
#[derive(Debug, Clone, PartialEq)]
pub struct MarkOutcome {
    /// The task id belonged to the plan and the report was recorded.
    pub applied: bool,
    /// Every task is completed, nobody notified yet, and this caller now holds the
    /// notification claim. Release it with [`CoordinatorState::release_notification`]
    /// when the notifier fails.
    pub should_notify: bool,
}

impl CoordinatorState {
    /// Create the state for a new upload from an explicit plan.
    pub fn plan(event: &UploadEvent, tasks: Vec<ProcessingTask>, now: DateTime<Utc>) -> Self {
        let mut entries = BTreeMap::new();
        for task in tasks {
            entries
                .entry(task.id())
                .or_insert_with(|| TaskEntry::pending(task));
        }

        let metadata = match &event.metadata {
            Some(Value::Object(map)) => Value::Object(map.clone()),
            Some(Value::Null) | None => Value::Object(Map::new()),
            Some(other) => json!({ "upload_metadata": other }),
        };

        let status = if entries.is_empty() {
            AggregateStatus::Skipped
        } else {
            AggregateStatus::Queued
        };

        Self {
            identity: event.identity(),
            session_id: event.session_id.clone(),
            upload_id: event.upload_id.clone(),
            owner_id: event.owner_id.clone(),
            key: event.key.clone(),
            bucket: event.bucket.clone(),
            content_type: event.content_type.clone(),
            metadata,
            tasks: entries,
            derived_assets: Vec::new(),
            status,
            created_at: now,
            completed_at: None,
            notified_at: None,
            notification_claimed_at: None,
        }
    }

    /// Plan-or-resume. Plans only when no state exists, then re-emits every task
    /// that is still pending.
    pub fn process(
        existing: Option<CoordinatorState>,
        event: &UploadEvent,
        now: DateTime<Utc>,
    ) -> ProcessOutcome {
        let (mut state, created) = match existing {
            Some(state) => (state, false),
            None => (Self::plan(event, build_tasks(event), now), true),
        };

        let tasks = state.pending_messages();
        if !tasks.is_empty() {
            state.status = AggregateStatus::Running;
        }

        ProcessOutcome {
            state,
            tasks,
            created,
        }
    }

    pub fn pending_task_ids(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|(_, entry)| entry.status == TaskStatus::Pending)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn pending_messages(&self) -> Vec<ProcessingTaskMessage> {
        self.tasks
            .values()
            .filter(|entry| entry.status == TaskStatus::Pending)
            .map(|entry| self.message_for(entry.task.clone()))
            .collect()
    }

    pub fn message_for(&self, task: ProcessingTask) -> ProcessingTaskMessage {
        ProcessingTaskMessage {
            message_type: PROCESSING_TASK_MESSAGE.to_string(),
            session_id: self.session_id.clone(),
            upload_id: self.upload_id.clone(),
            owner_id: self.owner_id.clone(),
            key: self.key.clone(),
            bucket: self.bucket.clone(),
            content_type: self.content_type.clone(),
            metadata: self.metadata.clone(),
            task,
        }
    }

    /// Some task failed and the queue will not deliver it again.
    pub fn has_exhausted_failure(&self) -> bool {
        self.tasks
            .values()
            .any(|entry| entry.exhausted && entry.status == TaskStatus::Failed)
    }

    pub fn all_completed(&self) -> bool {
        !self.tasks.is_empty()
            && self
                .tasks
                .values()
                .all(|entry| entry.status == TaskStatus::Completed)
    }

    /// Record one task outcome. The last report for a task id wins.
    pub fn mark_task(&mut self, completion: &TaskCompletion, now: DateTime<Utc>) -> MarkOutcome {
        let task_id = completion.task.id();
        let Some(entry) = self.tasks.get_mut(&task_id) else {
            tracing::warn!(
                identity = %self.identity,
                task_id = %task_id,
                "Ignoring report for a task that is not part of the plan"
            );
            return MarkOutcome {
                applied: false,
                should_notify: false,
            };
        };

        entry.attempts = entry.attempts.saturating_add(1);
        entry.updated_at = Some(now);
        let mut superseded = None;
        match &completion.error {
            Some(error) => {
                entry.status = TaskStatus::Failed;
                entry.error = Some(error.clone());
                entry.exhausted = completion.final_attempt;
            }
            None => {
                entry.status = TaskStatus::Completed;
                entry.error = None;
                entry.exhausted = false;
                if let Some(derived) = &completion.derived {
                    superseded = entry
                        .derived_key
                        .replace(derived.key.clone())
                        .filter(|previous| *previous != derived.key);
                }
            }
        }

        if let Some(previous) = superseded {
            self.derived_assets.retain(|d| d.key != previous);
        }
        if let Some(derived) = &completion.derived {
            if !self.derived_assets.iter().any(|d| d.key == derived.key) {
                self.derived_assets.push(derived.clone());
            }
            if derived.is_safety_scan() {
                self.hoist_safety_fields(derived);
            }
        }

        self.status = if completion.error.is_some() || self.has_exhausted_failure() {
            AggregateStatus::Failed
        } else if self.all_completed() {
            AggregateStatus::Completed
        } else {
            AggregateStatus::Running
        };
        self.set_metadata("last_activity_at", json!(now.to_rfc3339()));

        if self.status == AggregateStatus::Completed && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }

        let should_notify = self.status == AggregateStatus::Completed
            && self.notified_at.is_none()
            && self.notification_claimed_at.is_none();
        if should_notify {
            self.notification_claimed_at = Some(now);
        }

        MarkOutcome {
            applied: true,
            should_notify,
        }
    }

    /// Remember that the completion notification went out.
    pub fn record_notified(&mut self, now: DateTime<Utc>) {
        if self.notified_at.is_none() {
            self.notified_at = Some(now);
        }
        self.notification_claimed_at = None;
    }

    /// Give the notification claim back so a later report can retry it.
    pub fn release_notification(&mut self) {
        self.notification_claimed_at = None;
    }

    fn hoist_safety_fields(&mut self, derived: &DerivedAssetRecord) {
        if let Some(decision) = derived.metadata.get("decision").cloned() {
            self.set_metadata("safety_decision", decision);
        }
        if let Some(scanned_at) = derived.metadata.get("scanned_at").cloned() {
            self.set_metadata("safety_scanned_at", scanned_at);
        }
    }

    fn set_metadata(&mut self, key: &str, value: Value) {
        if !self.metadata.is_object() {
            self.metadata = Value::Object(Map::new());
        }
        if let Value::Object(map) = &mut self.metadata {
            map.insert(key.to_string(), value);
        }
    }
}
