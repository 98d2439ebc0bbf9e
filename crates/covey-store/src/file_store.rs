//! File-system chunk storage backend.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs;
use tracing::debug;

use covey_types::chunk_storage_path;

use crate::error::StoreError;
use crate::traits::{ChunkStore, check_name};

/// File-based chunk store.
///
/// Chunks live as plain files under `<base>/chunks/`, named exactly by
/// their chunk name. Writes go to a temporary file first and are renamed
/// into place, so a crash never leaves a half-written chunk behind.
pub struct FileStore {
    chunk_dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `base`, creating the chunk directory if
    /// necessary.
    pub async fn open(base: impl AsRef<Path>) -> Result<Self, StoreError> {
        let chunk_dir = base.as_ref().join("chunks");
        fs::create_dir_all(&chunk_dir).await?;
        Ok(Self { chunk_dir })
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.chunk_dir.join(name)
    }
}

#[async_trait::async_trait]
impl ChunkStore for FileStore {
    async fn put(&self, name: &str, data: Bytes) -> Result<String, StoreError> {
        check_name(name)?;
        let path = self.path_of(name);

        // Write to a temp file, then rename into place (atomic on POSIX).
        // The suffix is appended rather than swapped in so parts of the
        // same file never share a temp path.
        let tmp_path = self.chunk_dir.join(format!("{name}.tmp"));
        fs::write(&tmp_path, &data).await?;
        fs::rename(&tmp_path, &path).await?;

        debug!(name, size = data.len(), "stored chunk");
        Ok(chunk_storage_path(name))
    }

    async fn get(&self, name: &str) -> Result<Option<Bytes>, StoreError> {
        check_name(name)?;
        match fs::read(self.path_of(name)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        check_name(name)?;
        match fs::remove_file(self.path_of(name)).await {
            Ok(()) => {
                debug!(name, "deleted chunk");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn contains(&self, name: &str) -> Result<bool, StoreError> {
        check_name(name)?;
        Ok(fs::try_exists(self.path_of(name)).await?)
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.chunk_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str()
                && !name.ends_with(".tmp")
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
