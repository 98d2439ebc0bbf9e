//! In-memory chunk storage backend.

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use tracing::debug;

use covey_types::chunk_storage_path;

use crate::error::StoreError;
use crate::traits::{ChunkStore, check_name};

/// In-memory chunk store backed by a `RwLock<HashMap>`.
///
/// Useful for testing and for nodes configured to run in memory-only
/// mode.
#[derive(Default)]
pub struct MemoryStore {
    chunks: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace stored bytes without going through `put`.
    ///
    /// Test hook for simulating silent corruption of a holder's data.
    pub fn corrupt(&self, name: &str, data: Bytes) {
        let mut map = self.chunks.write().expect("lock poisoned");
        map.insert(name.to_string(), data);
    }
}

#[async_trait::async_trait]
impl ChunkStore for MemoryStore {
    async fn put(&self, name: &str, data: Bytes) -> Result<String, StoreError> {
        check_name(name)?;
        debug!(name, size = data.len(), "storing chunk in memory");
        let mut map = self.chunks.write().expect("lock poisoned");
        map.insert(name.to_string(), data);
        Ok(chunk_storage_path(name))
    }

    async fn get(&self, name: &str) -> Result<Option<Bytes>, StoreError> {
        check_name(name)?;
        let map = self.chunks.read().expect("lock poisoned");
        Ok(map.get(name).cloned())
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        check_name(name)?;
        let mut map = self.chunks.write().expect("lock poisoned");
        map.remove(name);
        Ok(())
    }

    async fn contains(&self, name: &str) -> Result<bool, StoreError> {
        check_name(name)?;
        let map = self.chunks.read().expect("lock poisoned");
        Ok(map.contains_key(name))
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let map = self.chunks.read().expect("lock poisoned");
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryStore::new();
        let path = store
            .put("a.txt.part-0", Bytes::from_static(b"in memory"))
            .await
            .unwrap();
        assert_eq!(path, "chunks/a.txt.part-0");
        let data = store.get("a.txt.part-0").await.unwrap();
        assert_eq!(data, Some(Bytes::from_static(b"in memory")));
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_then_get_returns_none() {
        let store = MemoryStore::new();
        store
            .put("a.txt.part-0", Bytes::from_static(b"bytes"))
            .await
            .unwrap();
        store.delete("a.txt.part-0").await.unwrap();
        assert_eq!(store.get("a.txt.part-0").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let store = MemoryStore::new();
        store.put("b", Bytes::from_static(b"1")).await.unwrap();
        store.put("a", Bytes::from_static(b"2")).await.unwrap();
        store.put("c", Bytes::from_static(b"3")).await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_corrupt_replaces_bytes() {
        let store = MemoryStore::new();
        store
            .put("a.txt.part-0", Bytes::from_static(b"good"))
            .await
            .unwrap();
        store.corrupt("a.txt.part-0", Bytes::from_static(b"bad"));
        let data = store.get("a.txt.part-0").await.unwrap();
        assert_eq!(data, Some(Bytes::from_static(b"bad")));
    }

    #[tokio::test]
    async fn test_invalid_name_rejected() {
        let store = MemoryStore::new();
        let result = store.put("../escape", Bytes::from_static(b"x")).await;
        assert!(matches!(result, Err(StoreError::InvalidName(_))));
    }
}
