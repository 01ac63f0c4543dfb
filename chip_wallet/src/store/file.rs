//! File-backed snapshot store with atomic write-back.

use super::{SnapshotStore, StoreResult};
use crate::ledger::state::ServiceState;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Snapshot store writing one JSON blob to disk.
///
/// Writes go to a temporary file in the same directory, are flushed with
/// `sync_all`, and then renamed over the target. Rename within one directory
/// is atomic on POSIX filesystems, so a crash mid-write leaves the previous
/// snapshot intact.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a file store for the given snapshot path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the committed snapshot.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for FileStore {
    async fn load(&self) -> StoreResult<Option<ServiceState>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state = serde_json::from_slice(&bytes)?;
        Ok(Some(state))
    }

    async fn save(&self, state: &ServiceState) -> StoreResult<()> {
        let bytes = serde_json::to_vec(state)?;
        let tmp = self.temp_path();

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
