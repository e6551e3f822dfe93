//! Queue handler trait
//!
//! A consumer calls `handle` for every delivered message. `Ok` acknowledges the
//! message; `Err` schedules a redelivery after the consumer's retry delay.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use assetline_db::QueueMessage;

#[async_trait]
pub trait QueueHandler: Send + Sync {
    async fn handle(self: Arc<Self>, message: &QueueMessage) -> Result<()>;
}
