//! End-to-end dispatcher runs over in-memory queue, coordinator store, session cache
//! and object storage.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use assetline_core::models::{AggregateStatus, CoordinatorState, SessionRecord, TaskStatus};
use assetline_core::{ProcessingConfig, QueueConfig};
use assetline_db::{
    InMemoryCoordinatorStore, InMemoryQueue, InMemorySessionCache, MessageQueue, SessionCache,
};
use assetline_infra::{CompletionNotifier, NotifyOutcome};
use assetline_processing::ProcessorRegistry;
use assetline_storage::{MemoryStorage, Storage};
use assetline_worker::{CoordinatorService, DispatchContext, Dispatcher};

const EVENTS: &str = "upload-events";
const TASKS: &str = "processing-tasks";

#[derive(Default)]
struct RecordingNotifier {
    notified: Mutex<Vec<CoordinatorState>>,
}

impl RecordingNotifier {
    fn count(&self) -> usize {
        self.notified.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionNotifier for RecordingNotifier {
    async fn notify(&self, state: &CoordinatorState) -> Result<NotifyOutcome> {
        self.notified.lock().unwrap().push(state.clone());
        Ok(NotifyOutcome::Delivered)
    }
}

struct Harness {
    queue: InMemoryQueue,
    storage: MemoryStorage,
    sessions: InMemorySessionCache,
    notifier: Arc<RecordingNotifier>,
    coordinator: CoordinatorService,
    dispatcher: Dispatcher,
}

impl Harness {
    fn new(processing: ProcessingConfig, max_attempts: i32, default_bucket: Option<&str>) -> Self {
        let queue = InMemoryQueue::new(max_attempts);
        let storage = MemoryStorage::new();
        let sessions = InMemorySessionCache::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let coordinator =
            CoordinatorService::new(Arc::new(InMemoryCoordinatorStore::new()), notifier.clone());
        let registry = ProcessorRegistry::from_config(Arc::new(storage.clone()), &processing)
            .expect("registry");

        let queues = QueueConfig {
            max_delivery_attempts: max_attempts,
            upload_event_retry_delay_secs: 0,
            task_retry_delay_secs: 0,
            ..QueueConfig::default()
        };
        let context = Arc::new(DispatchContext {
            coordinator: coordinator.clone(),
            queue: Arc::new(queue.clone()),
            sessions: Arc::new(sessions.clone()),
            registry,
            queues,
            default_bucket: default_bucket.map(str::to_string),
        });

        Self {
            queue,
            storage,
            sessions,
            notifier,
            coordinator,
            dispatcher: Dispatcher::new(context),
        }
    }

    async fn publish(&self, event: Value) {
        self.queue.send(EVENTS, event).await.unwrap();
    }

    async fn state(&self, identity: &str) -> CoordinatorState {
        self.coordinator.get(identity).await.unwrap().expect("state")
    }
}

fn resize_config(base_url: Option<String>) -> ProcessingConfig {
    ProcessingConfig {
        image_resize_base_url: base_url,
        ..ProcessingConfig::default()
    }
}

#[tokio::test]
async fn image_upload_completes_and_notifies_once() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", mockito::Matcher::Any)
        .with_status(200)
        .with_body("resized")
        .create_async()
        .await;

    let harness = Harness::new(resize_config(Some(server.url())), 5, None);
    harness
        .sessions
        .put(
            "s-1",
            &SessionRecord {
                owner_id: Some("owner-1".into()),
                bucket: Some("uploads".into()),
                content_type: Some("image/jpeg".into()),
                metadata: None,
            },
        )
        .await
        .unwrap();
    harness
        .storage
        .put("uploads", "u/1.jpg", b"jpeg".to_vec(), "image/jpeg")
        .await
        .unwrap();

    harness
        .publish(json!({"type": "upload.completed", "sessionId": "s-1", "key": "u/1.jpg"}))
        .await;
    harness.dispatcher.drain().await.unwrap();

    let state = harness.state("s-1").await;
    assert_eq!(state.status, AggregateStatus::Completed);
    assert_eq!(state.owner_id.as_deref(), Some("owner-1"));
    assert!(state.completed_at.is_some());
    assert!(state.notified_at.is_some());
    let mut ids: Vec<_> = state.tasks.keys().cloned().collect();
    ids.sort();
    assert_eq!(ids, ["image.preview:1280", "image.thumbnail:512", "safety.scan"]);
    assert_eq!(state.derived_assets.len(), 3);
    assert_eq!(state.metadata["safety_decision"], "pending");

    assert_eq!(
        harness.storage.keys("uploads"),
        [
            "u/1.jpg",
            "u/1__preview_1280.webp",
            "u/1__safety.json",
            "u/1__thumbnail_512.webp",
        ]
    );
    assert_eq!(harness.notifier.count(), 1);
    assert!(harness.queue.pending(TASKS).unwrap().is_empty());
}

#[tokio::test]
async fn redelivered_event_emits_no_new_work() {
    let harness = Harness::new(ProcessingConfig::default(), 5, Some("uploads"));
    let event = json!({
        "type": "upload.completed",
        "uploadId": "up-7",
        "key": "misc/notes.bin",
    });

    harness.publish(event.clone()).await;
    harness.dispatcher.drain().await.unwrap();
    let first = harness.state("up-7").await;
    assert_eq!(first.bucket, "uploads");
    assert_eq!(first.status, AggregateStatus::Completed);

    harness.publish(event).await;
    let handled = harness.dispatcher.drain().await.unwrap();

    assert_eq!(handled, 1);
    let second = harness.state("up-7").await;
    assert_eq!(second.derived_assets.len(), first.derived_assets.len());
    assert_eq!(second.tasks, first.tasks);
    assert_eq!(harness.notifier.count(), 1);
}

#[tokio::test]
async fn video_without_provider_uses_passthrough() {
    let harness = Harness::new(ProcessingConfig::default(), 5, None);
    harness
        .storage
        .put("media", "v/clip.mp4", b"mp4-bytes".to_vec(), "video/mp4")
        .await
        .unwrap();

    harness
        .publish(json!({
            "type": "upload.completed",
            "sessionId": "s-v",
            "key": "v/clip.mp4",
            "bucket": "media",
            "contentType": "video/mp4",
        }))
        .await;
    harness.dispatcher.drain().await.unwrap();

    let state = harness.state("s-v").await;
    assert_eq!(state.status, AggregateStatus::Completed);
    assert_eq!(state.tasks.len(), 5);

    let transcode = state
        .derived_assets
        .iter()
        .find(|d| d.key == "v/clip__stream.mp4")
        .expect("passthrough stream");
    assert_eq!(transcode.metadata["passthrough"], true);
    assert_eq!(transcode.metadata["transcoded"], false);
    assert_eq!(
        harness.storage.get("media", "v/clip__stream.mp4").await.unwrap(),
        b"mp4-bytes"
    );
}

#[tokio::test]
async fn text_like_pdf_is_truncated() {
    let harness = Harness::new(ProcessingConfig::default(), 5, None);
    let body = "a".repeat(25_000);
    harness
        .storage
        .put("docs", "reports/q3.pdf", body.into_bytes(), "application/pdf")
        .await
        .unwrap();

    harness
        .publish(json!({
            "type": "upload.completed",
            "sessionId": "s-d",
            "key": "reports/q3.pdf",
            "bucket": "docs",
            "contentType": "application/pdf",
            "metadata": {"processing": {"text_like": true}},
        }))
        .await;
    harness.dispatcher.drain().await.unwrap();

    let state = harness.state("s-d").await;
    assert_eq!(state.status, AggregateStatus::Completed);
    let text = state
        .derived_assets
        .iter()
        .find(|d| d.key == "reports/q3__text.txt")
        .expect("extracted text");
    assert_eq!(text.metadata["truncated"], true);
    assert_eq!(text.metadata["characters"], 20_000);

    let stored = harness.storage.get("docs", "reports/q3__text.txt").await.unwrap();
    assert_eq!(stored.len(), 20_000);
}

#[tokio::test]
async fn exhausted_tasks_fail_the_upload_and_dead_letter() {
    // No resize service configured: both image variants fail on every delivery.
    let harness = Harness::new(resize_config(None), 2, None);

    harness
        .publish(json!({
            "type": "upload.completed",
            "sessionId": "s-f",
            "key": "u/2.png",
            "bucket": "uploads",
            "contentType": "image/png",
        }))
        .await;
    harness.dispatcher.drain().await.unwrap();

    let state = harness.state("s-f").await;
    assert_eq!(state.status, AggregateStatus::Failed);
    assert!(state.completed_at.is_none());

    let thumbnail = &state.tasks["image.thumbnail:512"];
    assert_eq!(thumbnail.status, TaskStatus::Failed);
    assert_eq!(thumbnail.attempts, 2);
    assert!(thumbnail.exhausted);
    assert!(thumbnail
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("IMAGE_RESIZE_BASE_URL"));
    assert_eq!(state.tasks["safety.scan"].status, TaskStatus::Completed);

    assert_eq!(harness.queue.dead_letters(TASKS).unwrap().len(), 2);
    assert_eq!(harness.notifier.count(), 0);
}

#[tokio::test]
async fn event_without_bucket_is_dead_lettered() {
    let harness = Harness::new(ProcessingConfig::default(), 3, None);

    harness
        .publish(json!({"type": "upload.completed", "sessionId": "s-x", "key": "lost.bin"}))
        .await;
    harness.dispatcher.drain().await.unwrap();

    assert!(harness.coordinator.get("s-x").await.unwrap().is_none());
    let dead = harness.queue.dead_letters(EVENTS).unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].0.attempts, 3);
    assert!(harness.queue.pending(TASKS).unwrap().is_empty());
}
