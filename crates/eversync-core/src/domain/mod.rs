//! Domain entities shared by the synchronization engine and the ENML core

pub mod attributes;
pub mod data;
pub mod linked_notebook;
pub mod newtypes;
pub mod note;
pub mod notebook;
pub mod resource;
pub mod saved_search;
pub mod sync_chunk;
pub mod sync_state;
pub mod tag;

pub use attributes::{NoteAttributes, ResourceAttributes};
pub use data::Data;
pub use linked_notebook::LinkedNotebook;
pub use newtypes::{Guid, LocalId, Usn};
pub use note::Note;
pub use notebook::Notebook;
pub use resource::Resource;
pub use saved_search::SavedSearch;
pub use sync_chunk::{SyncChunk, SyncChunkFilter, SyncMode};
pub use sync_state::SyncState;
pub use tag::Tag;
