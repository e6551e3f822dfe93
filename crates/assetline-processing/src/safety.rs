//! Content safety scan placeholder
//!
//! Writes a `pending` verdict to `__safety.json`. The coordinator hoists `decision`
//! and `scanned_at` from the returned metadata, so a real scanner only needs to fill
//! those two fields.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use assetline_core::models::{DerivedAssetRecord, ProcessingTaskMessage, TaskKind};
use assetline_storage::{derived_key, Storage};

use crate::error::{ProcessingError, ProcessingResult};

#[derive(Clone)]
pub struct SafetyScanProcessor {
    storage: Arc<dyn Storage>,
}

impl SafetyScanProcessor {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    #[tracing::instrument(skip(self, message), fields(key = %message.key))]
    pub async fn process(
        &self,
        message: &ProcessingTaskMessage,
    ) -> ProcessingResult<DerivedAssetRecord> {
        let scanned_at = Utc::now().to_rfc3339();
        let report = json!({
            "decision": "pending",
            "scanned_at": scanned_at,
            "source_key": message.key,
            "content_type": message.content_type,
            "reason": "no content scanner is configured",
        });
        let body = serde_json::to_vec_pretty(&report)
            .map_err(|e| ProcessingError::InvalidInput(e.to_string()))?;

        let key = derived_key(&message.key, "safety", "json");
        let url = self
            .storage
            .put(&message.bucket, &key, body, "application/json")
            .await?;

        Ok(DerivedAssetRecord::new(
            TaskKind::SafetyScan,
            key,
            url,
            json!({
                "decision": "pending",
                "scanned_at": scanned_at,
                "placeholder": true,
            }),
        ))
    }
}
