//! Task-kind dispatch

use std::sync::Arc;
use std::time::Duration;

use assetline_core::models::{DerivedAssetRecord, ProcessingTask, ProcessingTaskMessage};
use assetline_core::ProcessingConfig;
use assetline_storage::Storage;

use crate::document::DocumentProcessor;
use crate::error::ProcessingResult;
use crate::image::{ImageVariantProcessor, ResizeClient};
use crate::safety::SafetyScanProcessor;
use crate::video::{VideoProcessor, VideoProviderClient};

/// One processor per task family, selected by the message's task kind.
#[derive(Clone)]
pub struct ProcessorRegistry {
    image: ImageVariantProcessor,
    video: VideoProcessor,
    document: DocumentProcessor,
    safety: SafetyScanProcessor,
}

impl ProcessorRegistry {
    pub fn new(
        image: ImageVariantProcessor,
        video: VideoProcessor,
        document: DocumentProcessor,
        safety: SafetyScanProcessor,
    ) -> Self {
        Self {
            image,
            video,
            document,
            safety,
        }
    }

    pub fn from_config(
        storage: Arc<dyn Storage>,
        config: &ProcessingConfig,
    ) -> ProcessingResult<Self> {
        let resize = ResizeClient::new(
            config.image_resize_base_url.clone(),
            Duration::from_secs(config.image_resize_timeout_secs),
        )?;
        let provider = VideoProviderClient::from_config(&config.video)?;
        if provider.is_none() {
            tracing::warn!("Video provider credentials not set; video.transcode will use passthrough");
        }

        Ok(Self::new(
            ImageVariantProcessor::new(storage.clone(), resize),
            VideoProcessor::new(storage.clone(), provider),
            DocumentProcessor::new(storage.clone(), config.document_text_max_chars),
            SafetyScanProcessor::new(storage),
        ))
    }

    pub async fn run(&self, message: &ProcessingTaskMessage) -> ProcessingResult<DerivedAssetRecord> {
        match message.task {
            ProcessingTask::ImageThumbnail { .. } | ProcessingTask::ImagePreview { .. } => {
                self.image.process(message).await
            }
            ProcessingTask::VideoTranscode
            | ProcessingTask::VideoThumbnail { .. }
            | ProcessingTask::VideoAudio
            | ProcessingTask::VideoTranscript => self.video.process(message).await,
            ProcessingTask::DocumentExtractText | ProcessingTask::DocumentPreview => {
                self.document.process(message).await
            }
            ProcessingTask::SafetyScan => self.safety.process(message).await,
        }
    }
}
