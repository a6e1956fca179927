//! Sync conflict resolution port

use crate::domain::{Note, Notebook, SavedSearch, Tag};

/// The outcome of resolving one incoming-vs-local conflict
///
/// A closed sum type: processors match on it exhaustively and treat any
/// future extension as a per-item runtime error rather than guessing.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictResolution<T> {
    /// Overwrite local with the incoming entity, preserving the local id
    /// and the locally-favorited flag
    UseTheirs,
    /// Keep the local entity, drop the incoming one
    UseMine,
    /// Treat the incoming entity as new; the local one is discarded
    IgnoreMine,
    /// Persist the renamed local copy first, then accept the incoming
    /// entity as new
    MoveMine(T),
}

/// Pluggable conflict resolution policy
///
/// Receives `(theirs, mine)` where `theirs` came from a sync chunk and
/// `mine` is the matching local entity (by guid, or by name when the guids
/// differ). Implementations decide per entity kind.
#[async_trait::async_trait]
pub trait ISyncConflictResolver: Send + Sync {
    async fn resolve_notebook_conflict(
        &self,
        theirs: Notebook,
        mine: Notebook,
    ) -> anyhow::Result<ConflictResolution<Notebook>>;

    async fn resolve_note_conflict(
        &self,
        theirs: Note,
        mine: Note,
    ) -> anyhow::Result<ConflictResolution<Note>>;

    async fn resolve_tag_conflict(
        &self,
        theirs: Tag,
        mine: Tag,
    ) -> anyhow::Result<ConflictResolution<Tag>>;

    async fn resolve_saved_search_conflict(
        &self,
        theirs: SavedSearch,
        mine: SavedSearch,
    ) -> anyhow::Result<ConflictResolution<SavedSearch>>;
}
