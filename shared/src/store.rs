use std::collections::HashMap;
use std::future::Future;

use tokio::sync::RwLock;

use crate::error::StoreError;

/// Key holding the JSON array of all points.
pub const POINTS_KEY: &str = "points";
/// Key holding the JSON array of all areas.
pub const AREAS_KEY: &str = "areas";
/// Key holding the JSON array of all users.
pub const USERS_KEY: &str = "users";

/// Key holding the stored file of plan `index`.
pub fn plan_file_key(index: usize) -> String {
    format!("planFile.{}", index)
}

/// Whole-value key/value persistence. A `set_string` replaces the previous
/// value; concurrent writers race and the last write wins.
pub trait ResourceStore: Send + Sync {
    fn get_string(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    fn set_string(
        &self,
        key: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Binary file persistence. Returns a locator (URL or opaque path).
pub trait BlobStore: Send + Sync {
    fn upload(
        &self,
        bytes: Vec<u8>,
        suggested_name: &str,
        content_type: &str,
    ) -> impl Future<Output = Result<String, StoreError>> + Send;
}

/// Process-local store, the on-device variant.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResourceStore for MemoryStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read(&self, locator: &str) -> Option<Vec<u8>> {
        self.blobs.read().await.get(locator).cloned()
    }
}

impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        suggested_name: &str,
        _content_type: &str,
    ) -> Result<String, StoreError> {
        let locator = format!("memory://{}/{}", uuid::Uuid::new_v4(), suggested_name);
        self.blobs.write().await.insert(locator.clone(), bytes);
        Ok(locator)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_overwrites_whole_value() {
        let store = MemoryStore::new();
        assert_eq!(store.get_string(POINTS_KEY).await.unwrap(), None);

        store.set_string(POINTS_KEY, "[1]").await.unwrap();
        store.set_string(POINTS_KEY, "[2]").await.unwrap();
        assert_eq!(
            store.get_string(POINTS_KEY).await.unwrap().as_deref(),
            Some("[2]")
        );
        assert_eq!(store.get_string(AREAS_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_blob_store_returns_readable_locator() {
        let blobs = MemoryBlobStore::new();
        let locator = blobs
            .upload(vec![1, 2, 3], "plan.png", "image/png")
            .await
            .unwrap();
        assert!(locator.ends_with("/plan.png"));
        assert_eq!(blobs.read(&locator).await, Some(vec![1, 2, 3]));
    }
}
