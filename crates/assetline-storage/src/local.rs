use crate::traits::{validate_key, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem storage implementation
///
/// Each bucket is a directory below `base_path`.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for buckets (e.g., "/var/lib/assetline/objects")
    /// * `base_url` - Base URL for serving files (e.g., "http://localhost:4000/objects")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url,
        })
    }

    /// Convert `(bucket, key)` to a filesystem path below the base directory.
    fn object_path(&self, bucket: &str, key: &str) -> StorageResult<PathBuf> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket.contains("..") {
            return Err(StorageError::InvalidKey(format!(
                "Invalid bucket name: {}",
                bucket
            )));
        }
        validate_key(key)?;

        let path = self.base_path.join(bucket).join(key);
        if path.strip_prefix(&self.base_path).is_err() {
            return Err(StorageError::InvalidKey(
                "Storage key resolves outside storage directory".to_string(),
            ));
        }
        Ok(path)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        let start = std::time::Instant::now();

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(format!("{}/{}", bucket, key)));
        }

        let data = fs::read(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to read file {}: {}", path.display(), e))
        })?;

        tracing::debug!(
            bucket = %bucket,
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage read successful"
        );

        Ok(data)
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> StorageResult<String> {
        let path = self.object_path(bucket, key)?;
        let size = data.len();

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        file.write_all(&data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            bucket = %bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage write successful"
        );

        Ok(self.public_url(bucket, key))
    }

    async fn copy(&self, bucket: &str, from_key: &str, to_key: &str) -> StorageResult<String> {
        let from = self.object_path(bucket, from_key)?;
        let to = self.object_path(bucket, to_key)?;

        if !fs::try_exists(&from).await.unwrap_or(false) {
            return Err(StorageError::NotFound(format!("{}/{}", bucket, from_key)));
        }

        self.ensure_parent_dir(&to).await?;
        fs::copy(&from, &to)
            .await
            .map_err(|e| StorageError::BackendError(format!("Failed to copy file: {}", e)))?;

        tracing::info!(
            bucket = %bucket,
            from_key = %from_key,
            to_key = %to_key,
            "Local storage copy successful"
        );

        Ok(self.public_url(bucket, to_key))
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let path = self.object_path(bucket, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to delete file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        let path = self.object_path(bucket, key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.base_url.trim_end_matches('/'), bucket, key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn storage() -> (TempDir, LocalStorage) {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path(), "http://localhost:4000/objects/".to_string())
            .await
            .unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn put_then_get_round_trips_within_a_bucket() {
        let (_dir, storage) = storage().await;

        let url = storage
            .put("uploads", "u/1.jpg", b"jpeg bytes".to_vec(), "image/jpeg")
            .await
            .unwrap();
        assert_eq!(url, "http://localhost:4000/objects/uploads/u/1.jpg");

        let data = storage.get("uploads", "u/1.jpg").await.unwrap();
        assert_eq!(data, b"jpeg bytes");

        assert!(matches!(
            storage.get("other", "u/1.jpg").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn path_traversal_is_rejected() {
        let (_dir, storage) = storage().await;

        assert!(matches!(
            storage.put("uploads", "../escape", vec![1], "text/plain").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            storage.get("../uploads", "a").await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn copy_duplicates_bytes() {
        let (_dir, storage) = storage().await;
        storage
            .put("uploads", "v.mp4", b"video".to_vec(), "video/mp4")
            .await
            .unwrap();

        let url = storage
            .copy("uploads", "v.mp4", "v__stream.mp4")
            .await
            .unwrap();
        assert!(url.ends_with("/uploads/v__stream.mp4"));
        assert_eq!(storage.get("uploads", "v__stream.mp4").await.unwrap(), b"video");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_dir, storage) = storage().await;
        storage
            .put("uploads", "a.txt", b"a".to_vec(), "text/plain")
            .await
            .unwrap();
        assert!(storage.exists("uploads", "a.txt").await.unwrap());

        storage.delete("uploads", "a.txt").await.unwrap();
        storage.delete("uploads", "a.txt").await.unwrap();
        assert!(!storage.exists("uploads", "a.txt").await.unwrap());
    }
}
