//! Completion notification
//!
//! When every task of an upload has completed, the owning record in the external
//! record store is patched to `completed` together with the accumulated metadata and
//! derived assets.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use assetline_core::models::{CoordinatorState, DerivedAssetRecord};
use assetline_core::NotifierConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Delivered,
    /// Nothing to notify (no session id, or no record store configured).
    Skipped(&'static str),
}

#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn notify(&self, state: &CoordinatorState) -> Result<NotifyOutcome>;
}

#[derive(Debug, Serialize)]
struct CompletionPatch<'a> {
    status: &'static str,
    completed_at: DateTime<Utc>,
    metadata: &'a serde_json::Value,
    derived_assets: &'a [DerivedAssetRecord],
}

/// Patches `{base}/records/{sessionId}`.
#[derive(Clone)]
pub struct RecordStoreNotifier {
    http_client: Client,
    base_url: Option<String>,
    token: Option<String>,
}

impl RecordStoreNotifier {
    pub fn new(config: &NotifierConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client for record store")?;

        Ok(Self {
            http_client,
            base_url: config
                .record_store_base_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            token: config.record_store_token.clone(),
        })
    }
}

#[async_trait]
impl CompletionNotifier for RecordStoreNotifier {
    #[tracing::instrument(skip(self, state), fields(identity = %state.identity))]
    async fn notify(&self, state: &CoordinatorState) -> Result<NotifyOutcome> {
        let Some(session_id) = state.session_id.as_deref().filter(|s| !s.is_empty()) else {
            tracing::info!("Upload has no session id; skipping record store update");
            return Ok(NotifyOutcome::Skipped("no session id"));
        };
        let Some(base_url) = self.base_url.as_deref() else {
            tracing::warn!("RECORD_STORE_BASE_URL not configured; skipping record store update");
            return Ok(NotifyOutcome::Skipped("record store not configured"));
        };

        let body = CompletionPatch {
            status: "completed",
            completed_at: state.completed_at.unwrap_or_else(Utc::now),
            metadata: &state.metadata,
            derived_assets: &state.derived_assets,
        };

        let mut request = self
            .http_client
            .patch(format!("{}/records/{}", base_url, session_id))
            .json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .context("Failed to reach record store")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "Record store update failed: {} - {}",
                status,
                error_text
            ));
        }

        tracing::info!(
            session_id = %session_id,
            derived_assets = state.derived_assets.len(),
            "Record store marked upload completed"
        );
        Ok(NotifyOutcome::Delivered)
    }
}

/// Logs instead of notifying.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

#[async_trait]
impl CompletionNotifier for NoopNotifier {
    async fn notify(&self, state: &CoordinatorState) -> Result<NotifyOutcome> {
        tracing::debug!(identity = %state.identity, "Completion notification disabled");
        Ok(NotifyOutcome::Skipped("notifications disabled"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetline_core::models::{
        CoordinatorState, ProcessingTask, TaskCompletion, TaskKind, UploadEvent,
    };
    use mockito::Matcher;
    use serde_json::json;

    fn completed_state(session_id: Option<&str>) -> CoordinatorState {
        let now = Utc::now();
        let event = UploadEvent {
            session_id: session_id.map(str::to_string),
            upload_id: Some("up-1".into()),
            owner_id: None,
            key: "files/a.bin".into(),
            bucket: "uploads".into(),
            content_type: None,
            metadata: None,
        };
        let mut state = CoordinatorState::process(None, &event, now).state;
        state.mark_task(
            &TaskCompletion::succeeded(
                ProcessingTask::SafetyScan,
                DerivedAssetRecord::new(
                    TaskKind::SafetyScan,
                    "files/a__safety.json",
                    "https://cdn.test/files/a__safety.json",
                    json!({"decision": "pending"}),
                ),
            ),
            now,
        );
        state
    }

    fn notifier(base_url: Option<String>, token: Option<&str>) -> RecordStoreNotifier {
        RecordStoreNotifier::new(&NotifierConfig {
            record_store_base_url: base_url,
            record_store_token: token.map(str::to_string),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn patches_record_with_derived_assets() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PATCH", "/records/s-1")
            .match_header("authorization", "Bearer secret-token")
            .match_body(Matcher::PartialJson(json!({
                "status": "completed",
                "derived_assets": [{"type": "safety.scan", "key": "files/a__safety.json"}],
                "metadata": {"safety_decision": "pending"}
            })))
            .with_status(200)
            .create_async()
            .await;

        let outcome = notifier(Some(server.url()), Some("secret-token"))
            .notify(&completed_state(Some("s-1")))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(outcome, NotifyOutcome::Delivered);
    }

    #[tokio::test]
    async fn missing_session_or_base_url_is_skipped() {
        let state = completed_state(None);
        assert!(matches!(
            notifier(Some("http://127.0.0.1:9".into()), None)
                .notify(&state)
                .await
                .unwrap(),
            NotifyOutcome::Skipped(_)
        ));
        assert!(matches!(
            notifier(None, None)
                .notify(&completed_state(Some("s-1")))
                .await
                .unwrap(),
            NotifyOutcome::Skipped(_)
        ));
    }

    #[tokio::test]
    async fn failed_patch_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PATCH", "/records/s-1")
            .with_status(503)
            .create_async()
            .await;

        let result = notifier(Some(server.url()), None)
            .notify(&completed_state(Some("s-1")))
            .await;
        assert!(result.is_err());
    }
}
