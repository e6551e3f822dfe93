//! Document text extraction and preview
//!
//! Text-like sources are read, trimmed and capped at `max_chars` characters. Binary
//! documents (PDF, Office) get a `pending` placeholder until an external extractor
//! is connected.

use serde_json::json;
use std::sync::Arc;

use assetline_core::models::{DerivedAssetRecord, ProcessingTask, ProcessingTaskMessage};
use assetline_storage::{derived_key, Storage};

use crate::error::{ProcessingError, ProcessingResult};

const PENDING_NOTE: &str = "Binary document extraction requires an external processor.";

/// Trim and cap `text` at `max_chars` characters. Returns the excerpt and whether it
/// was cut.
pub fn excerpt(text: &str, max_chars: usize) -> (String, bool) {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => (trimmed[..cut].to_string(), true),
        None => (trimmed.to_string(), false),
    }
}

#[derive(Clone)]
pub struct DocumentProcessor {
    storage: Arc<dyn Storage>,
    max_chars: usize,
}

impl DocumentProcessor {
    pub fn new(storage: Arc<dyn Storage>, max_chars: usize) -> Self {
        Self { storage, max_chars }
    }

    #[tracing::instrument(skip(self, message), fields(key = %message.key, task = %message.task))]
    pub async fn process(
        &self,
        message: &ProcessingTaskMessage,
    ) -> ProcessingResult<DerivedAssetRecord> {
        let marker = match message.task {
            ProcessingTask::DocumentExtractText => "text",
            ProcessingTask::DocumentPreview => "preview",
            ref other => {
                return Err(ProcessingError::InvalidInput(format!(
                    "{} is not a document task",
                    other
                )))
            }
        };
        let key = derived_key(&message.key, marker, "txt");

        if !message.is_text_like() {
            let url = self
                .storage
                .put(
                    &message.bucket,
                    &key,
                    PENDING_NOTE.as_bytes().to_vec(),
                    "text/plain; charset=utf-8",
                )
                .await?;
            return Ok(DerivedAssetRecord::new(
                message.task.kind(),
                key,
                url,
                json!({
                    "status": "pending",
                    "placeholder": true,
                    "reason": PENDING_NOTE,
                    "source_content_type": message.content_type,
                }),
            ));
        }

        let data = self.storage.get(&message.bucket, &message.key).await?;
        let text = String::from_utf8_lossy(&data);
        let (excerpt, truncated) = excerpt(&text, self.max_chars);
        let characters = excerpt.chars().count();

        let url = self
            .storage
            .put(
                &message.bucket,
                &key,
                excerpt.into_bytes(),
                "text/plain; charset=utf-8",
            )
            .await?;

        tracing::info!(
            derived_key = %key,
            characters = characters,
            truncated = truncated,
            "Document text stored"
        );

        Ok(DerivedAssetRecord::new(
            message.task.kind(),
            key,
            url,
            json!({
                "status": "extracted",
                "characters": characters,
                "truncated": truncated,
                "max_characters": self.max_chars,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetline_storage::MemoryStorage;

    fn message(task: ProcessingTask, content_type: &str, text_like: bool) -> ProcessingTaskMessage {
        ProcessingTaskMessage {
            message_type: "processing.task".into(),
            session_id: None,
            upload_id: Some("up-1".into()),
            owner_id: None,
            key: "docs/report.pdf".into(),
            bucket: "uploads".into(),
            content_type: Some(content_type.into()),
            metadata: json!({"processing": {"text_like": text_like}}),
            task,
        }
    }

    #[test]
    fn excerpt_counts_characters_not_bytes() {
        assert_eq!(excerpt("  héllo  ", 10), ("héllo".to_string(), false));
        assert_eq!(excerpt("ééééé", 3), ("ééé".to_string(), true));
        assert_eq!(excerpt("abc", 3), ("abc".to_string(), false));
    }

    #[tokio::test]
    async fn long_text_like_pdf_is_truncated() {
        let storage = MemoryStorage::new();
        storage
            .put("uploads", "docs/report.pdf", "x".repeat(25_000).into_bytes(), "application/pdf")
            .await
            .unwrap();
        let processor = DocumentProcessor::new(Arc::new(storage.clone()), 20_000);

        let record = processor
            .process(&message(ProcessingTask::DocumentExtractText, "application/pdf", true))
            .await
            .unwrap();

        assert_eq!(record.key, "docs/report__text.txt");
        assert_eq!(record.metadata["truncated"], true);
        assert_eq!(record.metadata["characters"], 20_000);
        let stored = storage.get("uploads", "docs/report__text.txt").await.unwrap();
        assert_eq!(stored.len(), 20_000);
    }

    #[tokio::test]
    async fn binary_documents_get_a_pending_placeholder() {
        let storage = MemoryStorage::new();
        let processor = DocumentProcessor::new(Arc::new(storage.clone()), 20_000);

        let record = processor
            .process(&message(ProcessingTask::DocumentPreview, "application/pdf", false))
            .await
            .unwrap();

        assert_eq!(record.key, "docs/report__preview.txt");
        assert_eq!(record.metadata["status"], "pending");
        assert!(storage.exists("uploads", "docs/report__preview.txt").await.unwrap());
    }

    #[tokio::test]
    async fn text_content_type_is_extracted_without_flag() {
        let storage = MemoryStorage::new();
        storage
            .put("uploads", "docs/report.pdf", b"  hello  ".to_vec(), "text/plain")
            .await
            .unwrap();
        let processor = DocumentProcessor::new(Arc::new(storage.clone()), 20_000);

        let mut msg = message(ProcessingTask::DocumentPreview, "text/plain", false);
        msg.metadata = json!({});
        let record = processor.process(&msg).await.unwrap();

        assert_eq!(record.metadata["truncated"], false);
        assert_eq!(
            storage.get("uploads", "docs/report__preview.txt").await.unwrap(),
            b"hello"
        );
    }
}
