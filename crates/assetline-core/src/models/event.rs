use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Message type published by the upload-finalization service.
pub const UPLOAD_COMPLETED_EVENT: &str = "upload.completed";

/// Wire form of an upload-completed event as it arrives on the event queue.
///
/// Minimal producers may only send `sessionId` and `key`; the remaining fields are
/// filled from the session cache before the event is handed to the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEventMessage {
    #[serde(rename = "type", default = "default_event_type")]
    pub event_type: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub upload_id: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    pub key: String,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub absolute_url: Option<String>,
}

fn default_event_type() -> String {
    UPLOAD_COMPLETED_EVENT.to_string()
}

/// Upload context cached by the session service under `session:{sessionId}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// One finalized upload, after enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEvent {
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
    pub metadata: Option<serde_json::Value>,
}

/// Durable coordinator identity: `sessionId ?? uploadId ?? key`.
pub fn coordinator_identity(
    session_id: Option<&str>,
    upload_id: Option<&str>,
    key: &str,
) -> String {
    session_id
        .filter(|s| !s.is_empty())
        .or(upload_id.filter(|s| !s.is_empty()))
        .unwrap_or(key)
        .to_string()
}

impl UploadEvent {
    pub fn identity(&self) -> String {
        coordinator_identity(
            self.session_id.as_deref(),
            self.upload_id.as_deref(),
            &self.key,
        )
    }
}

impl UploadEventMessage {
    /// Fill fields the triggering event left empty from the cached session.
    pub fn enrich(&mut self, session: SessionRecord) {
        if self.owner_id.is_none() {
            self.owner_id = session.owner_id;
        }
        if self.bucket.is_none() {
            self.bucket = session.bucket;
        }
        if self.content_type.is_none() {
            self.content_type = session.content_type;
        }
        if self.metadata.is_none() {
            self.metadata = session.metadata;
        }
    }

    /// Convert into an [`UploadEvent`], using `default_bucket` when the message carried none.
    pub fn into_event(self, default_bucket: Option<&str>) -> Result<UploadEvent, AppError> {
        if self.key.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "upload event is missing an object key".to_string(),
            ));
        }
        let bucket = self
            .bucket
            .filter(|b| !b.is_empty())
            .or_else(|| default_bucket.map(str::to_string))
            .ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "upload event for key {} has no bucket and no default bucket is configured",
                    self.key
                ))
            })?;

        Ok(UploadEvent {
            session_id: self.session_id,
            upload_id: self.upload_id,
            owner_id: self.owner_id,
            key: self.key,
            bucket,
            content_type: self.content_type,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_prefers_session_then_upload_then_key() {
        assert_eq!(coordinator_identity(Some("s1"), Some("u1"), "k"), "s1");
        assert_eq!(coordinator_identity(None, Some("u1"), "k"), "u1");
        assert_eq!(coordinator_identity(None, None, "k"), "k");
        assert_eq!(coordinator_identity(Some(""), None, "k"), "k");
    }

    #[test]
    fn minimal_message_deserializes() {
        let message: UploadEventMessage =
            serde_json::from_value(json!({"sessionId": "s1", "key": "u/1.jpg"})).unwrap();
        assert_eq!(message.event_type, UPLOAD_COMPLETED_EVENT);
        assert_eq!(message.session_id.as_deref(), Some("s1"));
        assert!(message.bucket.is_none());
    }

    #[test]
    fn enrichment_only_fills_missing_fields() {
        let mut message = UploadEventMessage {
            key: "u/1.jpg".into(),
            content_type: Some("image/png".into()),
            ..Default::default()
        };
        message.enrich(SessionRecord {
            owner_id: Some("owner".into()),
            bucket: Some("uploads".into()),
            content_type: Some("image/jpeg".into()),
            metadata: Some(json!({"a": 1})),
        });
        assert_eq!(message.owner_id.as_deref(), Some("owner"));
        assert_eq!(message.bucket.as_deref(), Some("uploads"));
        assert_eq!(message.content_type.as_deref(), Some("image/png"));
        assert_eq!(message.metadata, Some(json!({"a": 1})));
    }

    #[test]
    fn into_event_requires_a_bucket() {
        let message = UploadEventMessage {
            key: "u/1.jpg".into(),
            ..Default::default()
        };
        assert!(message.clone().into_event(None).is_err());
        let event = message.into_event(Some("default")).unwrap();
        assert_eq!(event.bucket, "default");
    }
}
