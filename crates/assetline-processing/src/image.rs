//! Image variants through an external resize service
//!
//! The service is addressed as `GET {base}/{ops}/{encoded-source-url}` where `ops` is a
//! comma-separated option list (`width=512,quality=75,format=webp`). Output formats are
//! tried in a source-aware order and the first success is stored.

use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use assetline_core::models::{DerivedAssetRecord, ProcessingTask, ProcessingTaskMessage};
use assetline_storage::{derived_key, extension, Storage};

use crate::error::{ProcessingError, ProcessingResult};

const SERVICE: &str = "image resize";
const THUMBNAIL_QUALITY: u8 = 75;
const PREVIEW_QUALITY: u8 = 85;

const RAW_LIKE_MARKERS: [&str; 10] = [
    "heic", "heif", "tif", "tiff", "dng", "cr2", "nef", "arw", "raw", "orf",
];

/// Output format preference for a source image. Camera-raw and HEIC sources go to
/// JPEG first; PNG and GIF keep an alpha-capable format first.
pub fn format_candidates(content_type: Option<&str>, key: &str) -> [&'static str; 3] {
    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
    let ext = extension(key).unwrap_or_default();

    let raw_like = RAW_LIKE_MARKERS
        .iter()
        .any(|m| content_type.contains(m) || ext == *m);
    if raw_like {
        return ["jpeg", "webp", "png"];
    }

    let alpha = content_type == "image/png"
        || content_type == "image/gif"
        || ext == "png"
        || ext == "gif";
    if alpha {
        return ["webp", "png", "jpeg"];
    }

    ["webp", "jpeg", "png"]
}

/// File extension used when storing a variant.
fn format_extension(format: &str) -> &str {
    match format {
        "jpeg" => "jpg",
        other => other,
    }
}

/// Resize options in the order the service expects.
pub fn resize_ops(width: u32, height: Option<u32>, quality: u8, format: &str) -> String {
    let mut ops = vec![format!("width={}", width)];
    if let Some(height) = height {
        ops.push(format!("height={}", height));
    }
    ops.push(format!("quality={}", quality));
    ops.push(format!("format={}", format));
    ops.join(",")
}

#[derive(Clone)]
pub struct ResizeClient {
    http_client: Client,
    base_url: Option<String>,
}

impl ResizeClient {
    pub fn new(base_url: Option<String>, timeout: Duration) -> ProcessingResult<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub async fn resize(&self, source_url: &str, ops: &str) -> ProcessingResult<Vec<u8>> {
        let base_url = self.base_url.as_deref().ok_or_else(|| {
            ProcessingError::Configuration("IMAGE_RESIZE_BASE_URL is not configured".to_string())
        })?;
        let url = format!(
            "{}/{}/{}",
            base_url.trim_end_matches('/'),
            ops,
            urlencoding::encode(source_url)
        );

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProcessingError::provider(
                SERVICE,
                format!("{} - {}", status, error_text),
            ));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ProcessingError::provider(SERVICE, "empty response body"));
        }
        Ok(bytes.to_vec())
    }
}

/// Produces `image.thumbnail` and `image.preview` variants.
#[derive(Clone)]
pub struct ImageVariantProcessor {
    storage: Arc<dyn Storage>,
    client: ResizeClient,
}

impl ImageVariantProcessor {
    pub fn new(storage: Arc<dyn Storage>, client: ResizeClient) -> Self {
        Self { storage, client }
    }

    #[tracing::instrument(skip(self, message), fields(key = %message.key, task = %message.task))]
    pub async fn process(
        &self,
        message: &ProcessingTaskMessage,
    ) -> ProcessingResult<DerivedAssetRecord> {
        let (marker, width, height, quality) = match &message.task {
            ProcessingTask::ImageThumbnail { width, height } => {
                ("thumbnail", *width, *height, THUMBNAIL_QUALITY)
            }
            ProcessingTask::ImagePreview { width, height } => {
                ("preview", *width, *height, PREVIEW_QUALITY)
            }
            other => {
                return Err(ProcessingError::InvalidInput(format!(
                    "{} is not an image variant task",
                    other
                )))
            }
        };

        let source_url = self.storage.public_url(&message.bucket, &message.key);
        let variant = format!("{}_{}", marker, width);
        let candidates = format_candidates(message.content_type.as_deref(), &message.key);
        let mut last_error = None;

        for format in candidates {
            let ops = resize_ops(width, height, quality, format);
            match self.client.resize(&source_url, &ops).await {
                Ok(bytes) => {
                    let key = derived_key(&message.key, &variant, format_extension(format));
                    let size = bytes.len();
                    let url = self
                        .storage
                        .put(&message.bucket, &key, bytes, &format!("image/{}", format))
                        .await?;
                    self.remove_stale_variants(message, &variant, format, &candidates)
                        .await;

                    tracing::info!(
                        derived_key = %key,
                        format = %format,
                        size_bytes = size,
                        "Image variant stored"
                    );

                    return Ok(DerivedAssetRecord::new(
                        message.task.kind(),
                        key,
                        url,
                        json!({
                            "width": width,
                            "height": height,
                            "format": format,
                            "quality": quality,
                            "size_bytes": size,
                        }),
                    ));
                }
                Err(e @ ProcessingError::Configuration(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(format = %format, error = %e, "Resize attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ProcessingError::provider(SERVICE, "no output format attempted")))
    }

    /// An earlier delivery may have stored this variant in another format.
    async fn remove_stale_variants(
        &self,
        message: &ProcessingTaskMessage,
        variant: &str,
        stored_format: &str,
        candidates: &[&str],
    ) {
        for format in candidates.iter().filter(|f| **f != stored_format) {
            let key = derived_key(&message.key, variant, format_extension(format));
            if let Err(e) = self.storage.delete(&message.bucket, &key).await {
                tracing::warn!(derived_key = %key, error = %e, "Failed to remove stale variant");
            }
        }
    }
}
