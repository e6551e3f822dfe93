//! Video and audio processors
//!
//! `video.transcode` prefers the managed video-hosting provider and falls back to a
//! passthrough copy of the source, so the task always yields a playable asset.
//! `video.thumbnail`, `video.audio` and `video.transcript` are placeholders that keep
//! the derived-asset contract (deterministic key, typed metadata) until real frame
//! extraction, demuxing and speech-to-text are wired in.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use assetline_core::models::{DerivedAssetRecord, ProcessingTask, ProcessingTaskMessage, TaskKind};
use assetline_core::VideoProviderConfig;
use assetline_storage::{derived_key, extension, Storage};

use crate::error::{ProcessingError, ProcessingResult};

const SERVICE: &str = "video provider";

/// 1x1 transparent PNG stored as the poster placeholder.
const PLACEHOLDER_POSTER_PNG: [u8; 67] = [
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

const PLACEHOLDER_TRANSCRIPT: &str =
    "Transcript unavailable: no speech-to-text provider is configured for this deployment.";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct DirectUpload {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    asset_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaybackId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Asset {
    id: String,
    status: String,
    #[serde(default)]
    playback_ids: Vec<PlaybackId>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    aspect_ratio: Option<String>,
}

/// A transcoded asset hosted by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct HostedVideo {
    pub asset_id: String,
    pub playback_id: String,
    pub playback_url: String,
    pub poster_url: String,
    pub duration: Option<f64>,
    pub aspect_ratio: Option<String>,
}

/// Client for the managed video-hosting API (Mux-compatible).
#[derive(Clone)]
pub struct VideoProviderClient {
    http_client: Client,
    token_id: String,
    token_secret: String,
    api_base: String,
    stream_base: String,
    image_base: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl VideoProviderClient {
    /// `None` when no credentials are configured.
    pub fn from_config(config: &VideoProviderConfig) -> ProcessingResult<Option<Self>> {
        if !config.has_credentials() {
            return Ok(None);
        }
        let (Some(token_id), Some(token_secret)) =
            (config.token_id.clone(), config.token_secret.clone())
        else {
            return Ok(None);
        };

        let http_client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;

        Ok(Some(Self {
            http_client,
            token_id,
            token_secret,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            stream_base: config.stream_base.trim_end_matches('/').to_string(),
            image_base: config.image_base.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            timeout: Duration::from_secs(config.timeout_secs),
        }))
    }

    async fn check(response: reqwest::Response, step: &str) -> ProcessingResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(ProcessingError::provider(
            SERVICE,
            format!("{}: {} - {}", step, status, error_text),
        ))
    }

    async fn create_upload(&self) -> ProcessingResult<DirectUpload> {
        let response = self
            .http_client
            .post(format!("{}/video/v1/uploads", self.api_base))
            .basic_auth(&self.token_id, Some(&self.token_secret))
            .json(&json!({
                "cors_origin": "*",
                "new_asset_settings": { "playback_policy": ["public"] },
            }))
            .send()
            .await?;
        let upload: Envelope<DirectUpload> = Self::check(response, "create upload")
            .await?
            .json()
            .await?;
        Ok(upload.data)
    }

    async fn push_bytes(&self, upload_url: &str, data: Vec<u8>, content_type: &str) -> ProcessingResult<()> {
        let response = self
            .http_client
            .put(upload_url)
            .header("content-type", content_type)
            .body(data)
            .send()
            .await?;
        Self::check(response, "upload bytes").await?;
        Ok(())
    }

    async fn get_upload(&self, upload_id: &str) -> ProcessingResult<DirectUpload> {
        let response = self
            .http_client
            .get(format!("{}/video/v1/uploads/{}", self.api_base, upload_id))
            .basic_auth(&self.token_id, Some(&self.token_secret))
            .send()
            .await?;
        let upload: Envelope<DirectUpload> = Self::check(response, "poll upload")
            .await?
            .json()
            .await?;
        Ok(upload.data)
    }

    async fn get_asset(&self, asset_id: &str) -> ProcessingResult<Asset> {
        let response = self
            .http_client
            .get(format!("{}/video/v1/assets/{}", self.api_base, asset_id))
            .basic_auth(&self.token_id, Some(&self.token_secret))
            .send()
            .await?;
        let asset: Envelope<Asset> = Self::check(response, "poll asset")
            .await?
            .json()
            .await?;
        Ok(asset.data)
    }

    /// Upload `data` and wait until the provider reports the asset `ready`.
    #[tracing::instrument(skip(self, data), fields(size_bytes = data.len()))]
    pub async fn transcode(&self, data: Vec<u8>, content_type: &str) -> ProcessingResult<HostedVideo> {
        let deadline = Instant::now() + self.timeout;

        let upload = self.create_upload().await?;
        let upload_url = upload.url.ok_or_else(|| {
            ProcessingError::provider(SERVICE, "create upload returned no upload url")
        })?;
        self.push_bytes(&upload_url, data, content_type).await?;

        tracing::info!(upload_id = %upload.id, "Source pushed, waiting for asset");

        let asset_id = loop {
            let current = self.get_upload(&upload.id).await?;
            if let Some(asset_id) = current.asset_id {
                break asset_id;
            }
            if let Some(status) = current.status.as_deref() {
                if matches!(status, "errored" | "cancelled" | "timed_out") {
                    return Err(ProcessingError::provider(
                        SERVICE,
                        format!("upload {} {}", upload.id, status),
                    ));
                }
            }
            self.wait(deadline, "asset id assignment").await?;
        };

        loop {
            let asset = self.get_asset(&asset_id).await?;
            match asset.status.as_str() {
                "ready" => {
                    let playback_id = asset
                        .playback_ids
                        .first()
                        .map(|p| p.id.clone())
                        .ok_or_else(|| {
                            ProcessingError::provider(SERVICE, "ready asset has no playback id")
                        })?;

                    tracing::info!(asset_id = %asset.id, playback_id = %playback_id, "Asset ready");

                    return Ok(HostedVideo {
                        asset_id: asset.id,
                        playback_url: format!("{}/{}.m3u8", self.stream_base, playback_id),
                        poster_url: format!("{}/{}/thumbnail.jpg", self.image_base, playback_id),
                        playback_id,
                        duration: asset.duration,
                        aspect_ratio: asset.aspect_ratio,
                    });
                }
                "errored" => {
                    return Err(ProcessingError::provider(
                        SERVICE,
                        format!("asset {} errored", asset.id),
                    ));
                }
                _ => self.wait(deadline, "asset readiness").await?,
            }
        }
    }

    async fn wait(&self, deadline: Instant, step: &str) -> ProcessingResult<()> {
        if Instant::now() + self.poll_interval > deadline {
            return Err(ProcessingError::Timeout(format!(
                "video provider {} exceeded {}s",
                step,
                self.timeout.as_secs()
            )));
        }
        sleep(self.poll_interval).await;
        Ok(())
    }
}

/// Handles every `video.*` task.
#[derive(Clone)]
pub struct VideoProcessor {
    storage: Arc<dyn Storage>,
    provider: Option<VideoProviderClient>,
}

impl VideoProcessor {
    pub fn new(storage: Arc<dyn Storage>, provider: Option<VideoProviderClient>) -> Self {
        Self { storage, provider }
    }

    #[tracing::instrument(skip(self, message), fields(key = %message.key, task = %message.task))]
    pub async fn process(
        &self,
        message: &ProcessingTaskMessage,
    ) -> ProcessingResult<DerivedAssetRecord> {
        match &message.task {
            ProcessingTask::VideoTranscode => self.transcode(message).await,
            ProcessingTask::VideoThumbnail { second } => self.poster(message, *second).await,
            ProcessingTask::VideoAudio => self.audio(message).await,
            ProcessingTask::VideoTranscript => self.transcript(message).await,
            other => Err(ProcessingError::InvalidInput(format!(
                "{} is not a video task",
                other
            ))),
        }
    }

    async fn transcode(&self, message: &ProcessingTaskMessage) -> ProcessingResult<DerivedAssetRecord> {
        let Some(provider) = &self.provider else {
            return self
                .passthrough(message, "video provider credentials are not configured")
                .await;
        };

        let hosted = async {
            let data = self.storage.get(&message.bucket, &message.key).await?;
            let content_type = message.content_type.as_deref().unwrap_or("video/mp4");
            provider.transcode(data, content_type).await
        }
        .await;

        match hosted {
            Ok(video) => Ok(DerivedAssetRecord::new(
                TaskKind::VideoTranscode,
                derived_key(&message.key, "stream", "m3u8"),
                video.playback_url.clone(),
                json!({
                    "provider": "mux",
                    "transcoded": true,
                    "passthrough": false,
                    "asset_id": video.asset_id,
                    "playback_id": video.playback_id,
                    "playback_url": video.playback_url,
                    "poster_url": video.poster_url,
                    "duration": video.duration,
                    "aspect_ratio": video.aspect_ratio,
                }),
            )),
            Err(e) => {
                tracing::warn!(error = %e, "Managed transcode failed, falling back to passthrough");
                self.passthrough(message, &e.to_string()).await
            }
        }
    }

    /// Copy the source verbatim to `__stream.mp4`.
    async fn passthrough(
        &self,
        message: &ProcessingTaskMessage,
        reason: &str,
    ) -> ProcessingResult<DerivedAssetRecord> {
        let key = derived_key(&message.key, "stream", "mp4");
        let url = self.storage.copy(&message.bucket, &message.key, &key).await?;

        tracing::info!(derived_key = %key, reason = %reason, "Stored passthrough stream");

        Ok(DerivedAssetRecord::new(
            TaskKind::VideoTranscode,
            key,
            url,
            json!({
                "passthrough": true,
                "transcoded": false,
                "reason": reason,
            }),
        ))
    }

    async fn poster(
        &self,
        message: &ProcessingTaskMessage,
        second: Option<f64>,
    ) -> ProcessingResult<DerivedAssetRecord> {
        let key = derived_key(&message.key, "poster", "png");
        let url = self
            .storage
            .put(&message.bucket, &key, PLACEHOLDER_POSTER_PNG.to_vec(), "image/png")
            .await?;

        Ok(DerivedAssetRecord::new(
            TaskKind::VideoThumbnail,
            key,
            url,
            json!({
                "placeholder": true,
                "second": second,
                "width": 1,
                "height": 1,
                "format": "png",
            }),
        ))
    }

    async fn audio(&self, message: &ProcessingTaskMessage) -> ProcessingResult<DerivedAssetRecord> {
        let data = self.storage.get(&message.bucket, &message.key).await?;
        let size = data.len();
        let ext = extension(&message.key).unwrap_or_else(|| "bin".to_string());
        let key = derived_key(&message.key, "audio", &ext);
        let content_type = message
            .content_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        let url = self
            .storage
            .put(&message.bucket, &key, data, content_type)
            .await?;

        Ok(DerivedAssetRecord::new(
            TaskKind::VideoAudio,
            key,
            url,
            json!({
                "placeholder": true,
                "size_bytes": size,
                "source_content_type": message.content_type,
            }),
        ))
    }

    async fn transcript(&self, message: &ProcessingTaskMessage) -> ProcessingResult<DerivedAssetRecord> {
        let key = derived_key(&message.key, "transcript", "txt");
        let url = self
            .storage
            .put(
                &message.bucket,
                &key,
                PLACEHOLDER_TRANSCRIPT.as_bytes().to_vec(),
                "text/plain; charset=utf-8",
            )
            .await?;

        Ok(DerivedAssetRecord::new(
            TaskKind::VideoTranscript,
            key,
            url,
            json!({
                "placeholder": true,
                "language": null,
                "characters": PLACEHOLDER_TRANSCRIPT.chars().count(),
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetline_storage::MemoryStorage;
    use mockito::Matcher;

    fn message(task: ProcessingTask, key: &str) -> ProcessingTaskMessage {
        ProcessingTaskMessage {
            message_type: "processing.task".into(),
            session_id: Some("s-1".into()),
            upload_id: None,
            owner_id: None,
            key: key.into(),
            bucket: "uploads".into(),
            content_type: Some("video/mp4".into()),
            metadata: json!({}),
            task,
        }
    }

    async fn seeded_storage(key: &str) -> MemoryStorage {
        let storage = MemoryStorage::new();
        storage
            .put("uploads", key, b"source-video".to_vec(), "video/mp4")
            .await
            .unwrap();
        storage
    }

    fn provider_config(base: &str) -> VideoProviderConfig {
        VideoProviderConfig {
            token_id: Some("token".into()),
            token_secret: Some("secret".into()),
            api_base: base.to_string(),
            stream_base: "https://stream.test".into(),
            image_base: "https://image.test".into(),
            poll_interval_ms: 10,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn transcode_without_credentials_is_passthrough() {
        let storage = seeded_storage("v/clip.mp4").await;
        let processor = VideoProcessor::new(Arc::new(storage.clone()), None);

        let record = processor
            .process(&message(ProcessingTask::VideoTranscode, "v/clip.mp4"))
            .await
            .unwrap();

        assert_eq!(record.key, "v/clip__stream.mp4");
        assert_eq!(record.metadata["passthrough"], true);
        assert_eq!(record.metadata["transcoded"], false);
        assert_eq!(
            storage.get("uploads", "v/clip__stream.mp4").await.unwrap(),
            b"source-video"
        );
    }

    #[tokio::test]
    async fn managed_transcode_returns_playback_urls() {
        let mut server = mockito::Server::new_async().await;
        let upload_url = format!("{}/direct-upload", server.url());

        server
            .mock("POST", "/video/v1/uploads")
            .with_status(201)
            .with_body(json!({"data": {"id": "up-1", "url": upload_url, "status": "waiting"}}).to_string())
            .create_async()
            .await;
        let put = server
            .mock("PUT", "/direct-upload")
            .match_body(Matcher::Exact("source-video".into()))
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("GET", "/video/v1/uploads/up-1")
            .with_status(200)
            .with_body(json!({"data": {"id": "up-1", "status": "asset_created", "asset_id": "as-1"}}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/video/v1/assets/as-1")
            .with_status(200)
            .with_body(
                json!({"data": {
                    "id": "as-1",
                    "status": "ready",
                    "playback_ids": [{"id": "pb-1", "policy": "public"}],
                    "duration": 12.5,
                    "aspect_ratio": "16:9"
                }})
                .to_string(),
            )
            .create_async()
            .await;

        let storage = seeded_storage("v/clip.mp4").await;
        let provider = VideoProviderClient::from_config(&provider_config(&server.url()))
            .unwrap()
            .unwrap();
        let processor = VideoProcessor::new(Arc::new(storage), Some(provider));

        let record = processor
            .process(&message(ProcessingTask::VideoTranscode, "v/clip.mp4"))
            .await
            .unwrap();

        put.assert_async().await;
        assert_eq!(record.url, "https://stream.test/pb-1.m3u8");
        assert_eq!(record.metadata["poster_url"], "https://image.test/pb-1/thumbnail.jpg");
        assert_eq!(record.metadata["duration"], 12.5);
        assert_eq!(record.metadata["aspect_ratio"], "16:9");
        assert_eq!(record.metadata["transcoded"], true);
    }

    #[tokio::test]
    async fn errored_asset_falls_back_to_passthrough() {
        let mut server = mockito::Server::new_async().await;
        let upload_url = format!("{}/direct-upload", server.url());

        server
            .mock("POST", "/video/v1/uploads")
            .with_status(201)
            .with_body(json!({"data": {"id": "up-2", "url": upload_url}}).to_string())
            .create_async()
            .await;
        server
            .mock("PUT", "/direct-upload")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("GET", "/video/v1/uploads/up-2")
            .with_status(200)
            .with_body(json!({"data": {"id": "up-2", "asset_id": "as-2"}}).to_string())
            .create_async()
            .await;
        let asset = server
            .mock("GET", "/video/v1/assets/as-2")
            .with_status(200)
            .with_body(json!({"data": {"id": "as-2", "status": "errored"}}).to_string())
            .expect(1)
            .create_async()
            .await;

        let storage = seeded_storage("v/clip.mp4").await;
        let provider = VideoProviderClient::from_config(&provider_config(&server.url()))
            .unwrap()
            .unwrap();
        let processor = VideoProcessor::new(Arc::new(storage), Some(provider));

        let record = processor
            .process(&message(ProcessingTask::VideoTranscode, "v/clip.mp4"))
            .await
            .unwrap();

        asset.assert_async().await;
        assert_eq!(record.metadata["passthrough"], true);
        assert!(record.metadata["reason"]
            .as_str()
            .unwrap()
            .contains("errored"));
    }

    #[tokio::test]
    async fn slow_asset_times_out_into_passthrough() {
        let mut server = mockito::Server::new_async().await;
        let upload_url = format!("{}/direct-upload", server.url());
        let mut config = provider_config(&server.url());
        config.timeout_secs = 0;

        server
            .mock("POST", "/video/v1/uploads")
            .with_status(201)
            .with_body(json!({"data": {"id": "up-3", "url": upload_url}}).to_string())
            .create_async()
            .await;
        server
            .mock("PUT", "/direct-upload")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("GET", "/video/v1/uploads/up-3")
            .with_status(200)
            .with_body(json!({"data": {"id": "up-3", "asset_id": "as-3"}}).to_string())
            .create_async()
            .await;
        let asset = server
            .mock("GET", "/video/v1/assets/as-3")
            .with_status(200)
            .with_body(json!({"data": {"id": "as-3", "status": "preparing"}}).to_string())
            .expect(1)
            .create_async()
            .await;

        let storage = seeded_storage("v/slow.mp4").await;
        let provider = VideoProviderClient::from_config(&config).unwrap().unwrap();
        let processor = VideoProcessor::new(Arc::new(storage.clone()), Some(provider));

        let record = processor
            .process(&message(ProcessingTask::VideoTranscode, "v/slow.mp4"))
            .await
            .unwrap();

        asset.assert_async().await;
        assert_eq!(record.key, "v/slow__stream.mp4");
        assert_eq!(record.metadata["passthrough"], true);
        assert_eq!(record.metadata["transcoded"], false);
        let reason = record.metadata["reason"].as_str().unwrap();
        assert!(reason.starts_with("Timed out"));
        assert!(reason.contains("asset readiness"));
        assert_eq!(
            storage.get("uploads", "v/slow__stream.mp4").await.unwrap(),
            b"source-video"
        );
    }

    #[tokio::test]
    async fn placeholders_use_deterministic_keys() {
        let storage = seeded_storage("v/clip.mp4").await;
        let processor = VideoProcessor::new(Arc::new(storage.clone()), None);

        let poster = processor
            .process(&message(ProcessingTask::VideoThumbnail { second: Some(1.0) }, "v/clip.mp4"))
            .await
            .unwrap();
        let audio = processor
            .process(&message(ProcessingTask::VideoAudio, "v/clip.mp4"))
            .await
            .unwrap();
        let transcript = processor
            .process(&message(ProcessingTask::VideoTranscript, "v/clip.mp4"))
            .await
            .unwrap();

        assert_eq!(poster.key, "v/clip__poster.png");
        assert_eq!(audio.key, "v/clip__audio.mp4");
        assert_eq!(transcript.key, "v/clip__transcript.txt");
        for record in [&poster, &audio, &transcript] {
            assert_eq!(record.metadata["placeholder"], true);
        }
        assert_eq!(
            storage.get("uploads", "v/clip__audio.mp4").await.unwrap(),
            b"source-video"
        );
    }

    #[tokio::test]
    async fn audio_without_extension_uses_bin() {
        let storage = seeded_storage("v/raw").await;
        let processor = VideoProcessor::new(Arc::new(storage), None);
        let record = processor
            .process(&message(ProcessingTask::VideoAudio, "v/raw"))
            .await
            .unwrap();
        assert_eq!(record.key, "v/raw__audio.bin");
    }
}
