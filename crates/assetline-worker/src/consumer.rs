//! Queue consumer: worker pool, polling, ack and delayed redelivery.
//!
//! Shutdown: [`QueueConsumer::shutdown`] signals the pool to stop claiming; it does not
//! wait for in-flight messages. Unacked messages become visible again after the
//! visibility timeout and are picked up by the next process.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;

use assetline_db::{MessageQueue, QueueMessage};

use crate::context::QueueHandler;

#[derive(Clone, Debug)]
pub struct ConsumerConfig {
    pub queue_name: String,
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    pub visibility_timeout: Duration,
    /// Delay before a failed message becomes visible again.
    pub retry_delay: Duration,
}

impl ConsumerConfig {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            max_workers: 4,
            poll_interval_ms: 1000,
            visibility_timeout: Duration::from_secs(900),
            retry_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct QueueConsumer {
    queue: Arc<dyn MessageQueue>,
    handler: Arc<dyn QueueHandler>,
    config: ConsumerConfig,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl QueueConsumer {
    /// Create a consumer without starting its worker pool.
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        handler: Arc<dyn QueueHandler>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            queue,
            handler,
            config,
            shutdown_tx: None,
        }
    }

    /// Spawn the worker pool.
    pub fn start(mut self) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let worker = self.clone();
        tokio::spawn(async move {
            worker.worker_pool(shutdown_rx).await;
        });
        self.shutdown_tx = Some(shutdown_tx);
        self
    }

    pub fn queue_name(&self) -> &str {
        &self.config.queue_name
    }

    async fn worker_pool(self, mut shutdown_rx: mpsc::Receiver<()>) {
        tracing::info!(
            queue = %self.config.queue_name,
            max_workers = self.config.max_workers,
            poll_interval_ms = self.config.poll_interval_ms,
            "Queue consumer started"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!(queue = %self.config.queue_name, "Queue consumer shutting down");
                    break;
                }
                _ = sleep(poll_interval) => {
                    self.claim_and_dispatch(&semaphore).await;
                }
            }
        }

        tracing::info!(queue = %self.config.queue_name, "Queue consumer stopped");
    }

    async fn claim_and_dispatch(&self, semaphore: &Arc<Semaphore>) {
        let available = semaphore.available_permits();
        if available == 0 {
            tracing::debug!(queue = %self.config.queue_name, "No workers available, skipping claim");
            return;
        }

        let messages = match self
            .queue
            .receive(
                &self.config.queue_name,
                available as i64,
                self.config.visibility_timeout,
            )
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                tracing::error!(queue = %self.config.queue_name, error = %e, "Failed to receive messages");
                return;
            }
        };

        for message in messages {
            let permit = match semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    // Stays invisible until the visibility timeout, then redelivers.
                    tracing::warn!(message_id = %message.id, "Claimed message without a free worker");
                    continue;
                }
            };

            let consumer = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = consumer.handle_message(message).await {
                    tracing::error!(error = %e, "Failed to settle queue message");
                }
            });
        }
    }

    /// Handle every currently visible message inline, until the queue has nothing
    /// visible. Returns the number of deliveries handled.
    pub async fn drain(&self) -> Result<usize> {
        let mut handled = 0;
        loop {
            let messages = self
                .queue
                .receive(
                    &self.config.queue_name,
                    self.config.max_workers.max(1) as i64,
                    self.config.visibility_timeout,
                )
                .await?;
            if messages.is_empty() {
                return Ok(handled);
            }
            for message in messages {
                self.handle_message(message).await?;
                handled += 1;
            }
        }
    }

    /// Run the handler, then ack or schedule redelivery.
    #[tracing::instrument(skip(self, message), fields(queue = %self.config.queue_name, message_id = %message.id, attempts = message.attempts))]
    async fn handle_message(&self, message: QueueMessage) -> Result<()> {
        let result = tokio::time::timeout(
            self.config.visibility_timeout,
            self.handler.clone().handle(&message),
        )
        .await;

        let error = match result {
            Ok(Ok(())) => {
                self.queue
                    .ack(message.id)
                    .await
                    .context("Failed to ack message")?;
                return Ok(());
            }
            Ok(Err(e)) => format!("{:#}", e),
            Err(_) => format!(
                "handler exceeded visibility timeout of {}s",
                self.config.visibility_timeout.as_secs()
            ),
        };

        tracing::warn!(
            error = %error,
            retry_delay_secs = self.config.retry_delay.as_secs(),
            final_attempt = self.queue.is_final_attempt(&message),
            "Message handling failed, scheduling redelivery"
        );
        self.queue
            .retry(&message, self.config.retry_delay, &error)
            .await
            .context("Failed to schedule redelivery")?;
        Ok(())
    }

    /// Signals the worker pool to stop claiming messages. Returns immediately.
    pub async fn shutdown(&self) {
        if let Some(tx) = &self.shutdown_tx {
            tracing::info!(queue = %self.config.queue_name, "Initiating queue consumer shutdown");
            let _ = tx.send(()).await;
        }
    }
}
