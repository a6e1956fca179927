//! Local content store port (driven/secondary port)
//!
//! The local store holds the synchronized copy of the account: notebooks,
//! notes, resources, tags, saved searches and linked notebooks. The engine
//! never owns the persistence format; any store honoring this contract
//! works (the reference application uses SQLite).
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are
//!   adapter-specific and don't need domain-level classification.
//! - All methods take `&self`; implementations must be safe for concurrent
//!   callers. The engine relies on that contract and adds no locking of
//!   its own around store calls.
//! - `find_*_by_name` lookups are scope-aware for notebooks and tags: the
//!   same name may exist in the user's own account and in any number of
//!   linked notebooks.

use crate::domain::{
    Guid, LinkedNotebook, LocalId, Note, Notebook, Resource, SavedSearch, Tag,
};

/// What to fetch along with a note
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchNoteOptions {
    /// Include resource metadata (guids, hashes, mime, sizes)
    pub with_resource_metadata: bool,
    /// Include resource binary bodies too
    pub with_resource_binary_data: bool,
}

/// Filter for `list_*` operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Only entities whose `locally_modified` flag is set
    pub locally_modified_only: bool,
}

/// Port trait for the local content store
#[async_trait::async_trait]
pub trait ILocalStore: Send + Sync {
    // Notebooks

    async fn find_notebook_by_guid(&self, guid: &Guid) -> anyhow::Result<Option<Notebook>>;

    /// Name lookup scoped to the user's own account when
    /// `linked_notebook_guid` is `None`, otherwise to that linked notebook
    async fn find_notebook_by_name(
        &self,
        name: &str,
        linked_notebook_guid: Option<&Guid>,
    ) -> anyhow::Result<Option<Notebook>>;

    async fn put_notebook(&self, notebook: Notebook) -> anyhow::Result<()>;

    async fn expunge_notebook_by_guid(&self, guid: &Guid) -> anyhow::Result<()>;

    async fn list_notebooks(&self, filter: ListFilter) -> anyhow::Result<Vec<Notebook>>;

    // Notes

    async fn find_note_by_guid(
        &self,
        guid: &Guid,
        options: FetchNoteOptions,
    ) -> anyhow::Result<Option<Note>>;

    async fn put_note(&self, note: Note) -> anyhow::Result<()>;

    async fn expunge_note_by_guid(&self, guid: &Guid) -> anyhow::Result<()>;

    async fn list_notes(&self, filter: ListFilter) -> anyhow::Result<Vec<Note>>;

    // Resources

    async fn find_resource_by_guid(
        &self,
        guid: &Guid,
        with_binary_data: bool,
    ) -> anyhow::Result<Option<Resource>>;

    async fn put_resource(&self, resource: Resource) -> anyhow::Result<()>;

    // Tags

    async fn find_tag_by_guid(&self, guid: &Guid) -> anyhow::Result<Option<Tag>>;

    async fn find_tag_by_name(
        &self,
        name: &str,
        linked_notebook_guid: Option<&Guid>,
    ) -> anyhow::Result<Option<Tag>>;

    async fn put_tag(&self, tag: Tag) -> anyhow::Result<()>;

    async fn expunge_tag_by_guid(&self, guid: &Guid) -> anyhow::Result<()>;

    async fn list_tags(&self, filter: ListFilter) -> anyhow::Result<Vec<Tag>>;

    // Saved searches

    async fn find_saved_search_by_guid(&self, guid: &Guid)
        -> anyhow::Result<Option<SavedSearch>>;

    async fn find_saved_search_by_name(&self, name: &str)
        -> anyhow::Result<Option<SavedSearch>>;

    async fn put_saved_search(&self, search: SavedSearch) -> anyhow::Result<()>;

    async fn expunge_saved_search_by_guid(&self, guid: &Guid) -> anyhow::Result<()>;

    async fn list_saved_searches(&self, filter: ListFilter) -> anyhow::Result<Vec<SavedSearch>>;

    // Linked notebooks

    async fn find_linked_notebook_by_guid(
        &self,
        guid: &Guid,
    ) -> anyhow::Result<Option<LinkedNotebook>>;

    async fn put_linked_notebook(&self, linked_notebook: LinkedNotebook) -> anyhow::Result<()>;

    async fn expunge_linked_notebook_by_guid(&self, guid: &Guid) -> anyhow::Result<()>;

    async fn list_linked_notebooks(&self) -> anyhow::Result<Vec<LinkedNotebook>>;

    /// Resolves the notebook owning the note with the given local id;
    /// used to pick the right note store shard for resource downloads
    async fn find_notebook_by_note_local_id(
        &self,
        note_local_id: &LocalId,
    ) -> anyhow::Result<Option<Notebook>>;
}
