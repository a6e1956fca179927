//! Item processors: apply downloaded sync chunks to the local store
//!
//! The four simple processors (notebooks, tags, saved searches, linked
//! notebooks) share one algorithm: collect entities and expunged guids
//! from the chunks, let the server's expunges win, expunge, then insert
//! or update each entity after conflict resolution.
//!
//! Notes and resources additionally download full bodies per item (sync
//! chunks carry only metadata for them) and get durable wrappers that
//! journal per-item outcomes on disk, so a retried sync skips the items
//! already applied.

pub mod durable_notes;
pub mod durable_resources;
pub mod journal;
pub mod linked_notebooks;
pub mod notebooks;
pub mod notes;
pub mod resources;
pub mod saved_searches;
pub mod tags;

pub use durable_notes::DurableNotesProcessor;
pub use durable_resources::DurableResourcesProcessor;
pub use linked_notebooks::{ILinkedNotebooksProcessorCallback, LinkedNotebooksProcessor};
pub use notebooks::{INotebooksProcessorCallback, NotebooksProcessor};
pub use notes::{INotesProcessor, INotesProcessorCallback, NotesProcessor};
pub use resources::{IResourcesProcessor, IResourcesProcessorCallback, ResourcesProcessor};
pub use saved_searches::{ISavedSearchesProcessorCallback, SavedSearchesProcessor};
pub use tags::{ITagsProcessorCallback, TagsProcessor};
