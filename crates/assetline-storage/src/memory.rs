//! In-process object store.
//!
//! Backs the dispatcher's end-to-end tests and local runs without object storage.

use crate::traits::{validate_key, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<Mutex<HashMap<(String, String), Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let objects = match self.objects.lock() {
            Ok(objects) => objects,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    fn objects(&self) -> StorageResult<std::sync::MutexGuard<'_, HashMap<(String, String), Vec<u8>>>> {
        self.objects
            .lock()
            .map_err(|_| StorageError::BackendError("memory storage poisoned".to_string()))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        self.objects()?
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", bucket, key)))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> StorageResult<String> {
        validate_key(key)?;
        self.objects()?
            .insert((bucket.to_string(), key.to_string()), data);
        Ok(self.public_url(bucket, key))
    }

    async fn copy(&self, bucket: &str, from_key: &str, to_key: &str) -> StorageResult<String> {
        validate_key(to_key)?;
        let mut objects = self.objects()?;
        let data = objects
            .get(&(bucket.to_string(), from_key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", bucket, from_key)))?;
        objects.insert((bucket.to_string(), to_key.to_string()), data);
        Ok(self.public_url(bucket, to_key))
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.objects()?
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        Ok(self
            .objects()?
            .contains_key(&(bucket.to_string(), key.to_string())))
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("memory://{}/{}", bucket, key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
