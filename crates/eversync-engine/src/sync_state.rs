//! File-backed sync state storage
//!
//! Persists the [`SyncState`] blob as JSON under the sync persistent
//! storage directory, next to the durable processor journals.

use std::path::PathBuf;

use tracing::warn;

use eversync_core::domain::SyncState;
use eversync_core::ports::ISyncStateStorage;

const SYNC_STATE_FILE_NAME: &str = "sync_state.json";

/// Stores the sync state in `<root>/sync_state.json`
///
/// A missing file reads as the default (never synchronized) state; a
/// corrupt file does too, with a warning, so a damaged blob costs one
/// full sync instead of aborting every run.
pub struct FileSyncStateStorage {
    file_path: PathBuf,
}

impl FileSyncStateStorage {
    pub fn new(sync_persistent_storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            file_path: sync_persistent_storage_dir.into().join(SYNC_STATE_FILE_NAME),
        }
    }
}

#[async_trait::async_trait]
impl ISyncStateStorage for FileSyncStateStorage {
    async fn get_sync_state(&self) -> anyhow::Result<SyncState> {
        let contents = match tokio::fs::read(&self.file_path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SyncState::default());
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "failed to read sync state file {}: {e}",
                    self.file_path.display()
                ));
            }
        };

        match serde_json::from_slice(&contents) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(
                    file = %self.file_path.display(),
                    error = %e,
                    "Failed to deserialize sync state, starting from scratch"
                );
                Ok(SyncState::default())
            }
        }
    }

    async fn set_sync_state(&self, state: SyncState) -> anyhow::Result<()> {
        if let Some(parent) = self.file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let serialized = serde_json::to_vec_pretty(&state)?;
        tokio::fs::write(&self.file_path, serialized).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use eversync_core::domain::Guid;

    #[tokio::test]
    async fn missing_file_reads_as_default_state() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSyncStateStorage::new(dir.path());

        let state = storage.get_sync_state().await.unwrap();
        assert_eq!(state, SyncState::default());
    }

    #[tokio::test]
    async fn state_round_trips_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSyncStateStorage::new(dir.path());

        let mut state = SyncState::default();
        state.user_data_update_count = 42;
        state.user_data_last_sync_time = 1_700_000_000_000;
        state
            .linked_notebook_update_counts
            .insert(Guid::new("lnb-1"), 17);

        storage.set_sync_state(state.clone()).await.unwrap();

        let reopened = FileSyncStateStorage::new(dir.path());
        let read = reopened.get_sync_state().await.unwrap();
        assert_eq!(read, state);
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_default_with_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SYNC_STATE_FILE_NAME), b"not json").unwrap();

        let storage = FileSyncStateStorage::new(dir.path());
        let state = storage.get_sync_state().await.unwrap();
        assert_eq!(state, SyncState::default());
    }
}
