//! Core trait for chunk storage.

use bytes::Bytes;

use crate::error::StoreError;

/// Trait for storing and retrieving file chunks by name.
///
/// All implementations must be `Send + Sync` for use across async tasks.
/// Chunk names are the wire names produced at placement time; the store
/// maps them to its own layout and `put` returns the path a chunk lives
/// at, relative to the node's data directory.
#[async_trait::async_trait]
pub trait ChunkStore: Send + Sync {
    /// Store a chunk under the given name, returning its relative path.
    async fn put(&self, name: &str, data: Bytes) -> Result<String, StoreError>;

    /// Retrieve a chunk by name. Returns `None` if not found.
    async fn get(&self, name: &str) -> Result<Option<Bytes>, StoreError>;

    /// Delete a chunk by name. Deleting a missing chunk is not an error.
    async fn delete(&self, name: &str) -> Result<(), StoreError>;

    /// Check whether a chunk exists.
    async fn contains(&self, name: &str) -> Result<bool, StoreError>;

    /// List all stored chunk names, sorted.
    async fn list(&self) -> Result<Vec<String>, StoreError>;
}

/// Reject names that are empty, oversized or could escape the store's
/// directory.
pub(crate) fn check_name(name: &str) -> Result<(), StoreError> {
    let bad = name.is_empty()
        || name.len() > 255
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if bad {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}
