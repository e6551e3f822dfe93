use serde::{Deserialize, Serialize};

use super::task::TaskKind;

/// One artifact produced from an upload.
///
/// `key` is deterministic for a given source key and task, so a redelivered task
/// rewrites the same object and the coordinator recognizes the duplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedAssetRecord {
    #[serde(rename = "type")]
    pub asset_type: TaskKind,
    pub key: String,
    pub url: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl DerivedAssetRecord {
    pub fn new(
        asset_type: TaskKind,
        key: impl Into<String>,
        url: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            asset_type,
            key: key.into(),
            url: url.into(),
            metadata,
        }
    }

    pub fn is_safety_scan(&self) -> bool {
        self.asset_type == TaskKind::SafetyScan
    }
}
