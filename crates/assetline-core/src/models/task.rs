use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Kind of a processing task, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskKind {
    #[serde(rename = "image.thumbnail")]
    ImageThumbnail,
    #[serde(rename = "image.preview")]
    ImagePreview,
    #[serde(rename = "video.transcode")]
    VideoTranscode,
    #[serde(rename = "video.thumbnail")]
    VideoThumbnail,
    #[serde(rename = "video.audio")]
    VideoAudio,
    #[serde(rename = "video.transcript")]
    VideoTranscript,
    #[serde(rename = "document.extract-text")]
    DocumentExtractText,
    #[serde(rename = "document.preview")]
    DocumentPreview,
    #[serde(rename = "safety.scan")]
    SafetyScan,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::ImageThumbnail => "image.thumbnail",
            TaskKind::ImagePreview => "image.preview",
            TaskKind::VideoTranscode => "video.transcode",
            TaskKind::VideoThumbnail => "video.thumbnail",
            TaskKind::VideoAudio => "video.audio",
            TaskKind::VideoTranscript => "video.transcript",
            TaskKind::DocumentExtractText => "document.extract-text",
            TaskKind::DocumentPreview => "document.preview",
            TaskKind::SafetyScan => "safety.scan",
        }
    }
}

impl Display for TaskKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image.thumbnail" => Ok(TaskKind::ImageThumbnail),
            "image.preview" => Ok(TaskKind::ImagePreview),
            "video.transcode" => Ok(TaskKind::VideoTranscode),
            "video.thumbnail" => Ok(TaskKind::VideoThumbnail),
            "video.audio" => Ok(TaskKind::VideoAudio),
            "video.transcript" => Ok(TaskKind::VideoTranscript),
            "document.extract-text" => Ok(TaskKind::DocumentExtractText),
            "document.preview" => Ok(TaskKind::DocumentPreview),
            "safety.scan" => Ok(TaskKind::SafetyScan),
            _ => Err(anyhow::anyhow!("Invalid task kind: {}", s)),
        }
    }
}

/// One unit of processing work planned for an upload.
///
/// The serialized form is tagged by `type`, e.g.
/// `{"type":"image.thumbnail","width":512}` or `{"type":"safety.scan"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProcessingTask {
    #[serde(rename = "image.thumbnail")]
    ImageThumbnail {
        width: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
    #[serde(rename = "image.preview")]
    ImagePreview {
        width: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
    #[serde(rename = "video.transcode")]
    VideoTranscode,
    #[serde(rename = "video.thumbnail")]
    VideoThumbnail {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        second: Option<f64>,
    },
    #[serde(rename = "video.audio")]
    VideoAudio,
    #[serde(rename = "video.transcript")]
    VideoTranscript,
    #[serde(rename = "document.extract-text")]
    DocumentExtractText,
    #[serde(rename = "document.preview")]
    DocumentPreview,
    #[serde(rename = "safety.scan")]
    SafetyScan,
}

impl ProcessingTask {
    pub fn kind(&self) -> TaskKind {
        match self {
            ProcessingTask::ImageThumbnail { .. } => TaskKind::ImageThumbnail,
            ProcessingTask::ImagePreview { .. } => TaskKind::ImagePreview,
            ProcessingTask::VideoTranscode => TaskKind::VideoTranscode,
            ProcessingTask::VideoThumbnail { .. } => TaskKind::VideoThumbnail,
            ProcessingTask::VideoAudio => TaskKind::VideoAudio,
            ProcessingTask::VideoTranscript => TaskKind::VideoTranscript,
            ProcessingTask::DocumentExtractText => TaskKind::DocumentExtractText,
            ProcessingTask::DocumentPreview => TaskKind::DocumentPreview,
            ProcessingTask::SafetyScan => TaskKind::SafetyScan,
        }
    }

    /// Stable identifier of the task within an upload's plan.
    ///
    /// Derived only from the kind, plus the dimensions for image variants:
    /// `image.thumbnail:512`, `image.preview:1280x720`, `safety.scan`.
    pub fn id(&self) -> String {
        match self {
            ProcessingTask::ImageThumbnail { width, height }
            | ProcessingTask::ImagePreview { width, height } => match height {
                Some(h) => format!("{}:{}x{}", self.kind(), width, h),
                None => format!("{}:{}", self.kind(), width),
            },
            other => other.kind().as_str().to_string(),
        }
    }

    /// Build the payload-free variant for a kind that carries no parameters.
    ///
    /// Returns `None` for image variants, which need explicit dimensions.
    pub fn from_kind(kind: TaskKind) -> Option<Self> {
        match kind {
            TaskKind::ImageThumbnail | TaskKind::ImagePreview => None,
            TaskKind::VideoTranscode => Some(ProcessingTask::VideoTranscode),
            TaskKind::VideoThumbnail => Some(ProcessingTask::VideoThumbnail { second: None }),
            TaskKind::VideoAudio => Some(ProcessingTask::VideoAudio),
            TaskKind::VideoTranscript => Some(ProcessingTask::VideoTranscript),
            TaskKind::DocumentExtractText => Some(ProcessingTask::DocumentExtractText),
            TaskKind::DocumentPreview => Some(ProcessingTask::DocumentPreview),
            TaskKind::SafetyScan => Some(ProcessingTask::SafetyScan),
        }
    }
}

impl Display for ProcessingTask {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.id())
    }
}
