//! Durable message queue
//!
//! At-least-once delivery: a received message becomes invisible for the visibility
//! timeout and comes back unless it is acked. Every delivery increments `attempts`;
//! once a message has been delivered `max_attempts` times a further failure
//! dead-letters it instead of scheduling another delivery.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QueueMessage {
    pub id: Uuid,
    pub queue: String,
    pub body: serde_json::Value,
    /// Deliveries so far, including the current one.
    pub attempts: i32,
    pub enqueued_at: DateTime<Utc>,
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn send(&self, queue: &str, body: serde_json::Value) -> Result<Uuid>;

    /// Claim up to `limit` visible messages, hiding them for `visibility`.
    async fn receive(
        &self,
        queue: &str,
        limit: i64,
        visibility: Duration,
    ) -> Result<Vec<QueueMessage>>;

    async fn ack(&self, message_id: Uuid) -> Result<()>;

    /// Make the message visible again after `delay`, or dead-letter it when its
    /// delivery budget is spent.
    async fn retry(&self, message: &QueueMessage, delay: Duration, error: &str) -> Result<()>;

    fn max_attempts(&self) -> i32;

    /// No further delivery will follow if this one fails.
    fn is_final_attempt(&self, message: &QueueMessage) -> bool {
        message.attempts >= self.max_attempts()
    }
}

#[derive(Clone)]
pub struct PgMessageQueue {
    pool: PgPool,
    max_attempts: i32,
}

impl PgMessageQueue {
    pub fn new(pool: PgPool, max_attempts: i32) -> Self {
        Self { pool, max_attempts }
    }

    /// Number of dead-lettered messages on `queue`.
    pub async fn dead_letter_count(&self, queue: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM queue_messages WHERE queue = $1 AND status = 'dead'",
        )
        .bind(queue)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count dead-lettered messages")?;
        Ok(count)
    }
}

#[async_trait]
impl MessageQueue for PgMessageQueue {
    #[tracing::instrument(skip(self, body))]
    async fn send(&self, queue: &str, body: serde_json::Value) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO queue_messages (id, queue, body, status, attempts, visible_at, enqueued_at, updated_at)
            VALUES ($1, $2, $3, 'ready', 0, NOW(), NOW(), NOW())
            "#,
        )
        .bind(id)
        .bind(queue)
        .bind(&body)
        .execute(&self.pool)
        .await
        .context("Failed to enqueue message")?;
        Ok(id)
    }

    async fn receive(
        &self,
        queue: &str,
        limit: i64,
        visibility: Duration,
    ) -> Result<Vec<QueueMessage>> {
        // Messages whose last delivery timed out after the final attempt never come back.
        sqlx::query(
            r#"
            UPDATE queue_messages
            SET status = 'dead',
                last_error = COALESCE(last_error, 'visibility timeout after final attempt'),
                updated_at = NOW()
            WHERE queue = $1
                AND status = 'ready'
                AND visible_at <= NOW()
                AND attempts >= $2
            "#,
        )
        .bind(queue)
        .bind(self.max_attempts)
        .execute(&self.pool)
        .await
        .context("Failed to dead-letter expired messages")?;

        let messages = sqlx::query_as::<Postgres, QueueMessage>(
            r#"
            UPDATE queue_messages
            SET attempts = attempts + 1,
                visible_at = NOW() + make_interval(secs => $3),
                updated_at = NOW()
            WHERE id IN (
                SELECT id FROM queue_messages
                WHERE queue = $1
                    AND status = 'ready'
                    AND visible_at <= NOW()
                ORDER BY enqueued_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, queue, body, attempts, enqueued_at
            "#,
        )
        .bind(queue)
        .bind(limit)
        .bind(visibility.as_secs_f64())
        .fetch_all(&self.pool)
        .await
        .context("Failed to claim queue messages")?;

        Ok(messages)
    }

    async fn ack(&self, message_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM queue_messages WHERE id = $1")
            .bind(message_id)
            .execute(&self.pool)
            .await
            .context("Failed to ack message")?;
        Ok(())
    }

    #[tracing::instrument(skip(self, message), fields(message_id = %message.id, attempts = message.attempts))]
    async fn retry(&self, message: &QueueMessage, delay: Duration, error: &str) -> Result<()> {
        if self.is_final_attempt(message) {
            sqlx::query(
                r#"
                UPDATE queue_messages
                SET status = 'dead', last_error = $2, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(message.id)
            .bind(error)
            .execute(&self.pool)
            .await
            .context("Failed to dead-letter message")?;

            tracing::warn!(queue = %message.queue, error = %error, "Message dead-lettered");
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE queue_messages
            SET visible_at = NOW() + make_interval(secs => $2),
                last_error = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(message.id)
        .bind(delay.as_secs_f64())
        .bind(error)
        .execute(&self.pool)
        .await
        .context("Failed to schedule message redelivery")?;
        Ok(())
    }

    fn max_attempts(&self) -> i32 {
        self.max_attempts
    }
}

#[derive(Debug, Clone)]
struct StoredMessage {
    message: QueueMessage,
    visible_at: DateTime<Utc>,
}

#[derive(Default)]
struct QueueState {
    ready: Vec<StoredMessage>,
    dead: Vec<(QueueMessage, String)>,
}

/// Queue kept in process memory with the same delivery semantics as [`PgMessageQueue`].
#[derive(Clone)]
pub struct InMemoryQueue {
    state: Arc<Mutex<QueueState>>,
    max_attempts: i32,
}

impl InMemoryQueue {
    pub fn new(max_attempts: i32) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            max_attempts,
        }
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, QueueState>> {
        self.state
            .lock()
            .map_err(|_| anyhow::anyhow!("in-memory queue poisoned"))
    }

    /// Messages not yet acked or dead-lettered on `queue`, visible or not.
    pub fn pending(&self, queue: &str) -> Result<Vec<QueueMessage>> {
        Ok(self
            .state()?
            .ready
            .iter()
            .filter(|m| m.message.queue == queue)
            .map(|m| m.message.clone())
            .collect())
    }

    /// Dead-lettered messages on `queue` with their last error.
    pub fn dead_letters(&self, queue: &str) -> Result<Vec<(QueueMessage, String)>> {
        Ok(self
            .state()?
            .dead
            .iter()
            .filter(|(m, _)| m.queue == queue)
            .cloned()
            .collect())
    }

    /// Per-queue count of pending messages.
    pub fn depth(&self) -> Result<HashMap<String, usize>> {
        let mut depth = HashMap::new();
        for stored in &self.state()?.ready {
            *depth.entry(stored.message.queue.clone()).or_insert(0) += 1;
        }
        Ok(depth)
    }
}

fn after(delay: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64)
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn send(&self, queue: &str, body: serde_json::Value) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.state()?.ready.push(StoredMessage {
            message: QueueMessage {
                id,
                queue: queue.to_string(),
                body,
                attempts: 0,
                enqueued_at: now,
            },
            visible_at: now,
        });
        Ok(id)
    }

    async fn receive(
        &self,
        queue: &str,
        limit: i64,
        visibility: Duration,
    ) -> Result<Vec<QueueMessage>> {
        let now = Utc::now();
        let max_attempts = self.max_attempts;
        let mut state = self.state()?;

        let (expired, ready): (Vec<_>, Vec<_>) =
            std::mem::take(&mut state.ready).into_iter().partition(|m| {
                m.message.queue == queue && m.visible_at <= now && m.message.attempts >= max_attempts
            });
        state.ready = ready;
        state.dead.extend(
            expired
                .into_iter()
                .map(|m| (m.message, "visibility timeout after final attempt".to_string())),
        );

        let mut claimed = Vec::new();
        for stored in state.ready.iter_mut() {
            if claimed.len() as i64 >= limit {
                break;
            }
            if stored.message.queue == queue && stored.visible_at <= now {
                stored.message.attempts += 1;
                stored.visible_at = after(visibility);
                claimed.push(stored.message.clone());
            }
        }
        Ok(claimed)
    }

    async fn ack(&self, message_id: Uuid) -> Result<()> {
        self.state()?.ready.retain(|m| m.message.id != message_id);
        Ok(())
    }

    async fn retry(&self, message: &QueueMessage, delay: Duration, error: &str) -> Result<()> {
        let final_attempt = self.is_final_attempt(message);
        let mut state = self.state()?;

        let Some(index) = state.ready.iter().position(|m| m.message.id == message.id) else {
            return Ok(());
        };
        if final_attempt {
            let stored = state.ready.remove(index);
            state.dead.push((stored.message, error.to_string()));
        } else {
            state.ready[index].visible_at = after(delay);
        }
        Ok(())
    }

    fn max_attempts(&self) -> i32 {
        self.max_attempts
    }
}
