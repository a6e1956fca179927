//! Sync chunk: the atomic download unit of incremental synchronization

use serde::{Deserialize, Serialize};

use super::linked_notebook::LinkedNotebook;
use super::newtypes::{Guid, Usn};
use super::note::Note;
use super::notebook::Notebook;
use super::resource::Resource;
use super::saved_search::SavedSearch;
use super::tag::Tag;

/// Whether a sync run starts from scratch or continues from a known USN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Everything is re-downloaded; expunged entries and standalone
    /// resources are not requested
    Full,
    /// Continue from the last known USN; expunged entries and standalone
    /// resources are requested too
    Incremental,
}

/// A bounded bundle of entities and expunge notices delivered by the service
///
/// Entity USNs fall in `(lo, hi]` where `hi == chunk_high_usn`. A chunk with
/// a non-null `chunk_high_usn` contains at least one entity or expunged guid
/// whose USN equals it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncChunk {
    /// Server clock at the time the chunk was produced, msec since epoch
    #[serde(default)]
    pub current_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_high_usn: Option<Usn>,
    /// The server's total update count for the scope at request time;
    /// downloading stops once `chunk_high_usn` reaches it
    #[serde(default)]
    pub update_count: Usn,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notebooks: Option<Vec<Notebook>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<Note>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Tag>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub searches: Option<Vec<SavedSearch>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<Resource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_notebooks: Option<Vec<LinkedNotebook>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expunged_notes: Option<Vec<Guid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expunged_notebooks: Option<Vec<Guid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expunged_tags: Option<Vec<Guid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expunged_searches: Option<Vec<Guid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expunged_linked_notebooks: Option<Vec<Guid>>,
}

/// What the remote service should include in a filtered sync chunk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncChunkFilter {
    pub include_notes: bool,
    pub include_notebooks: bool,
    pub include_tags: bool,
    pub include_searches: bool,
    pub include_resources: bool,
    pub include_note_resources: bool,
    pub include_note_attributes: bool,
    pub include_expunged: bool,
    pub include_note_application_data_full_map: bool,
    pub include_note_resource_application_data_full_map: bool,
    pub include_linked_notebooks: bool,
}

impl SyncChunkFilter {
    /// The filter the downloader uses for the user's own account
    pub fn for_user_own_sync(mode: SyncMode) -> Self {
        Self {
            include_notes: true,
            include_notebooks: true,
            include_tags: true,
            include_searches: true,
            include_note_resources: true,
            include_note_attributes: true,
            include_note_application_data_full_map: true,
            include_note_resource_application_data_full_map: true,
            include_linked_notebooks: true,
            // Expunged entries and standalone resources only make sense
            // when continuing from a previous state
            include_expunged: mode == SyncMode::Incremental,
            include_resources: mode == SyncMode::Incremental,
        }
    }
}
