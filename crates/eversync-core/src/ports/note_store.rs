//! Remote note store port (driven/secondary port)
//!
//! This is the wire-level surface the engine consumes from the remote
//! service. Implementations own transport, retry policy and request
//! contexts (including timeouts); the engine never re-implements those.
//!
//! ## Error contract
//!
//! Methods return `anyhow::Result`. Implementations must surface
//! rate-limit and auth-expiry conditions as
//! [`crate::errors::RemoteError::RateLimitReached`] /
//! [`crate::errors::RemoteError::AuthExpired`] somewhere in the error
//! chain, so that the engine's stop-error detection can find them and
//! abort the batch instead of hammering the service.

use std::sync::Arc;

use crate::domain::{
    Guid, LinkedNotebook, LocalId, Note, Notebook, Resource, SavedSearch, SyncChunk,
    SyncChunkFilter, Tag, Usn,
};

/// Port trait for one note store endpoint
///
/// The user's own account and every linked notebook shard get their own
/// `INoteStore` instance, resolved through [`INoteStoreProvider`].
#[async_trait::async_trait]
pub trait INoteStore: Send + Sync {
    /// The linked notebook this store points at, `None` for user-own
    fn linked_notebook_guid(&self) -> Option<&Guid>;

    /// Downloads one sync chunk of at most `max_entries` entities with
    /// USNs strictly greater than `after_usn`
    async fn get_filtered_sync_chunk(
        &self,
        after_usn: Usn,
        max_entries: i32,
        filter: &SyncChunkFilter,
    ) -> anyhow::Result<SyncChunk>;

    /// Linked-notebook variant; `full_sync_only` suppresses expunged
    /// entries the way the filter does for the user-own call
    async fn get_linked_notebook_sync_chunk(
        &self,
        linked_notebook: &LinkedNotebook,
        after_usn: Usn,
        max_entries: i32,
        full_sync_only: bool,
    ) -> anyhow::Result<SyncChunk>;

    /// Fetches a note with content, resource bodies, and recognition data
    async fn get_note_with_full_data(&self, guid: &Guid) -> anyhow::Result<Note>;

    /// Fetches a resource with its binary bodies
    async fn get_resource_with_full_data(&self, guid: &Guid) -> anyhow::Result<Resource>;

    // Upload surface. `create_*` returns the entity as acknowledged by the
    // service (guid and USN assigned); `update_*` returns the new USN.

    async fn create_notebook(&self, notebook: Notebook) -> anyhow::Result<Notebook>;
    async fn update_notebook(&self, notebook: Notebook) -> anyhow::Result<Usn>;

    async fn create_note(&self, note: Note) -> anyhow::Result<Note>;
    async fn update_note(&self, note: Note) -> anyhow::Result<Note>;

    async fn create_tag(&self, tag: Tag) -> anyhow::Result<Tag>;
    async fn update_tag(&self, tag: Tag) -> anyhow::Result<Usn>;

    async fn create_saved_search(&self, search: SavedSearch) -> anyhow::Result<SavedSearch>;
    async fn update_saved_search(&self, search: SavedSearch) -> anyhow::Result<Usn>;
}

/// Resolves the right note store for a scope, notebook or note
///
/// Linked notebooks live on their own shards, so everything which touches
/// a note must first resolve the endpoint for that note's notebook.
#[async_trait::async_trait]
pub trait INoteStoreProvider: Send + Sync {
    async fn user_own_note_store(&self) -> anyhow::Result<Arc<dyn INoteStore>>;

    async fn linked_notebook_note_store(
        &self,
        linked_notebook_guid: &Guid,
    ) -> anyhow::Result<Arc<dyn INoteStore>>;

    async fn note_store_for_notebook_guid(
        &self,
        notebook_guid: &Guid,
    ) -> anyhow::Result<Arc<dyn INoteStore>>;

    async fn note_store_for_note_local_id(
        &self,
        note_local_id: &LocalId,
    ) -> anyhow::Result<Arc<dyn INoteStore>>;
}
