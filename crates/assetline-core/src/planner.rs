//! Task planning: maps an upload to the set of processing tasks it needs.

use crate::models::{ProcessingTask, TaskKind, UploadEvent};

pub const IMAGE_THUMBNAIL_WIDTH: u32 = 512;
pub const IMAGE_PREVIEW_WIDTH: u32 = 1280;
pub const VIDEO_THUMBNAIL_SECOND: f64 = 1.0;

/// Task names a producer may request explicitly through `metadata.processing.tasks`.
const REQUESTABLE_TASKS: [TaskKind; 3] = [
    TaskKind::DocumentExtractText,
    TaskKind::DocumentPreview,
    TaskKind::SafetyScan,
];

const DOCUMENT_MARKERS: [&str; 4] = ["pdf", "msword", "presentation", "document"];

/// Build the task plan for an upload. Every plan contains exactly one `safety.scan`.
pub fn build_tasks(event: &UploadEvent) -> Vec<ProcessingTask> {
    if let Some(requested) = requested_tasks(event) {
        return requested;
    }

    let content_type = event
        .content_type
        .as_deref()
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    let mut tasks = if content_type.starts_with("image/") {
        vec![
            ProcessingTask::ImageThumbnail {
                width: IMAGE_THUMBNAIL_WIDTH,
                height: None,
            },
            ProcessingTask::ImagePreview {
                width: IMAGE_PREVIEW_WIDTH,
                height: None,
            },
        ]
    } else if content_type.starts_with("video/") {
        vec![
            ProcessingTask::VideoTranscode,
            ProcessingTask::VideoThumbnail {
                second: Some(VIDEO_THUMBNAIL_SECOND),
            },
            ProcessingTask::VideoAudio,
            ProcessingTask::VideoTranscript,
        ]
    } else if content_type.starts_with("audio/") {
        vec![ProcessingTask::VideoAudio, ProcessingTask::VideoTranscript]
    } else if is_document_like(&content_type) {
        vec![
            ProcessingTask::DocumentExtractText,
            ProcessingTask::DocumentPreview,
        ]
    } else {
        Vec::new()
    };

    tasks.push(ProcessingTask::SafetyScan);
    tasks
}

fn is_document_like(content_type: &str) -> bool {
    !content_type.is_empty() && DOCUMENT_MARKERS.iter().any(|m| content_type.contains(m))
}

/// Explicitly requested tasks, normalized and deduplicated, or `None` when the
/// metadata names no recognized task.
fn requested_tasks(event: &UploadEvent) -> Option<Vec<ProcessingTask>> {
    let names = event
        .metadata
        .as_ref()?
        .pointer("/processing/tasks")?
        .as_array()?;

    let mut tasks: Vec<ProcessingTask> = Vec::new();
    for name in names.iter().filter_map(|n| n.as_str()) {
        let Ok(kind) = name.trim().to_ascii_lowercase().parse::<TaskKind>() else {
            continue;
        };
        if !REQUESTABLE_TASKS.contains(&kind) {
            continue;
        }
        let Some(task) = ProcessingTask::from_kind(kind) else {
            continue;
        };
        if !tasks.iter().any(|t| t.id() == task.id()) {
            tasks.push(task);
        }
    }

    if tasks.is_empty() {
        return None;
    }
    if !tasks.contains(&ProcessingTask::SafetyScan) {
        tasks.push(ProcessingTask::SafetyScan);
    }
    Some(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn event(content_type: Option<&str>, metadata: Option<serde_json::Value>) -> UploadEvent {
        UploadEvent {
            session_id: None,
            upload_id: Some("up".into()),
            owner_id: None,
            key: "u/1.bin".into(),
            bucket: "uploads".into(),
            content_type: content_type.map(str::to_string),
            metadata,
        }
    }

    fn ids(content_type: Option<&str>) -> BTreeSet<String> {
        let tasks = build_tasks(&event(content_type, None));
        let ids: BTreeSet<String> = tasks.iter().map(|t| t.id()).collect();
        assert_eq!(ids.len(), tasks.len(), "duplicate task ids for {:?}", content_type);
        assert_eq!(
            tasks.iter().filter(|t| **t == ProcessingTask::SafetyScan).count(),
            1
        );
        ids
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn images_get_thumbnail_and_preview() {
        assert_eq!(
            ids(Some("image/png")),
            set(&["image.thumbnail:512", "image.preview:1280", "safety.scan"])
        );
    }

    #[test]
    fn videos_get_full_pipeline() {
        assert_eq!(
            ids(Some("video/mp4")),
            set(&[
                "video.transcode",
                "video.thumbnail",
                "video.audio",
                "video.transcript",
                "safety.scan"
            ])
        );
    }

    #[test]
    fn audio_gets_audio_and_transcript() {
        assert_eq!(
            ids(Some("audio/mpeg")),
            set(&["video.audio", "video.transcript", "safety.scan"])
        );
    }

    #[test]
    fn documents_get_text_and_preview() {
        let expected = set(&["document.extract-text", "document.preview", "safety.scan"]);
        assert_eq!(ids(Some("application/pdf")), expected);
        assert_eq!(ids(Some("application/msword")), expected);
        assert_eq!(
            ids(Some(
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            )),
            expected
        );
    }

    #[test]
    fn unknown_or_missing_type_is_scan_only() {
        assert_eq!(ids(None), set(&["safety.scan"]));
        assert_eq!(ids(Some("application/zip")), set(&["safety.scan"]));
    }

    #[test]
    fn content_type_match_is_case_insensitive() {
        assert_eq!(
            ids(Some("IMAGE/JPEG")),
            set(&["image.thumbnail:512", "image.preview:1280", "safety.scan"])
        );
    }

    #[test]
    fn requested_tasks_take_priority_and_always_include_scan() {
        let tasks = build_tasks(&event(
            Some("image/png"),
            Some(json!({"processing": {"tasks": [" Document.Extract-Text ", "document.extract-text"]}})),
        ));
        assert_eq!(
            tasks,
            vec![ProcessingTask::DocumentExtractText, ProcessingTask::SafetyScan]
        );
    }

    #[test]
    fn requested_scan_is_not_duplicated() {
        let tasks = build_tasks(&event(
            None,
            Some(json!({"processing": {"tasks": ["safety.scan", "document.preview", "safety.scan"]}})),
        ));
        assert_eq!(
            tasks,
            vec![ProcessingTask::SafetyScan, ProcessingTask::DocumentPreview]
        );
    }

    #[test]
    fn unrecognized_requests_fall_back_to_content_type() {
        let tasks = build_tasks(&event(
            Some("audio/wav"),
            Some(json!({"processing": {"tasks": ["video.transcode", "ocr"]}})),
        ));
        let ids: BTreeSet<String> = tasks.iter().map(|t| t.id()).collect();
        assert_eq!(ids, set(&["video.audio", "video.transcript", "safety.scan"]));
    }
}
