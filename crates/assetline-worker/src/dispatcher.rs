//! Dispatcher wiring: shared context and the two queue consumers.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use assetline_core::QueueConfig;
use assetline_db::{MessageQueue, SessionCache};
use assetline_processing::ProcessorRegistry;

use crate::consumer::{ConsumerConfig, QueueConsumer};
use crate::coordinator::CoordinatorService;
use crate::handlers::{ProcessingTaskHandler, UploadEventHandler};

/// Everything a handler needs, passed explicitly instead of read from globals.
pub struct DispatchContext {
    pub coordinator: CoordinatorService,
    pub queue: Arc<dyn MessageQueue>,
    pub sessions: Arc<dyn SessionCache>,
    pub registry: ProcessorRegistry,
    pub queues: QueueConfig,
    /// Used when neither the event nor its cached session names a bucket.
    pub default_bucket: Option<String>,
}

pub struct Dispatcher {
    upload_events: QueueConsumer,
    processing_tasks: QueueConsumer,
}

impl Dispatcher {
    pub fn new(context: Arc<DispatchContext>) -> Self {
        let queues = &context.queues;
        let consumer_config = |queue_name: &str, retry_delay_secs: u64| ConsumerConfig {
            queue_name: queue_name.to_string(),
            max_workers: queues.max_workers,
            poll_interval_ms: queues.poll_interval_ms,
            visibility_timeout: Duration::from_secs(queues.visibility_timeout_secs),
            retry_delay: Duration::from_secs(retry_delay_secs),
        };

        let upload_events = QueueConsumer::new(
            context.queue.clone(),
            Arc::new(UploadEventHandler::new(context.clone())),
            consumer_config(
                &queues.upload_event_queue,
                queues.upload_event_retry_delay_secs,
            ),
        );
        let processing_tasks = QueueConsumer::new(
            context.queue.clone(),
            Arc::new(ProcessingTaskHandler::new(context.clone())),
            consumer_config(&queues.processing_task_queue, queues.task_retry_delay_secs),
        );

        Self {
            upload_events,
            processing_tasks,
        }
    }

    /// Spawn both worker pools.
    pub fn start(self) -> Self {
        tracing::info!(
            upload_event_queue = %self.upload_events.queue_name(),
            processing_task_queue = %self.processing_tasks.queue_name(),
            "Starting dispatcher"
        );
        Self {
            upload_events: self.upload_events.start(),
            processing_tasks: self.processing_tasks.start(),
        }
    }

    /// Handle messages inline on both queues until neither has visible work.
    /// Returns the total number of deliveries handled.
    pub async fn drain(&self) -> Result<usize> {
        let mut total = 0;
        loop {
            let handled = self.upload_events.drain().await? + self.processing_tasks.drain().await?;
            if handled == 0 {
                return Ok(total);
            }
            total += handled;
        }
    }

    pub async fn shutdown(&self) {
        self.upload_events.shutdown().await;
        self.processing_tasks.shutdown().await;
    }
}
