//! Sync state persistence port

use crate::domain::SyncState;

/// Stores the [`SyncState`] blob between runs
#[async_trait::async_trait]
pub trait ISyncStateStorage: Send + Sync {
    async fn get_sync_state(&self) -> anyhow::Result<SyncState>;

    async fn set_sync_state(&self, state: SyncState) -> anyhow::Result<()>;
}
