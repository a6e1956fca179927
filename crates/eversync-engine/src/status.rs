//! Per-run status objects
//!
//! A batch of per-item operations reports into one shared status object
//! guarded by a mutex (multiple item tasks update it concurrently). No
//! error propagates out of a completed batch if any items succeeded; the
//! caller inspects the status to find failures.

use std::collections::HashMap;
use std::sync::Arc;

use eversync_core::domain::{Guid, Note, Resource, SyncState, Usn};
use eversync_core::errors::StopSynchronizationError;

/// A note together with the error that failed it
#[derive(Debug, Clone)]
pub struct NoteWithError {
    pub note: Note,
    pub error: Arc<anyhow::Error>,
}

/// A resource together with the error that failed it
#[derive(Debug, Clone)]
pub struct ResourceWithError {
    pub resource: Resource,
    pub error: Arc<anyhow::Error>,
}

/// A guid together with the error that failed its expunge
#[derive(Debug, Clone)]
pub struct GuidWithError {
    pub guid: Guid,
    pub error: Arc<anyhow::Error>,
}

/// Outcome of processing one note from a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessNoteStatus {
    AddedNote,
    UpdatedNote,
    ExpungedNote,
    IgnoredNote,
    FailedToDownloadFullNoteData,
    FailedToPutNoteToLocalStorage,
    FailedToExpungeNote,
    FailedToResolveNoteConflict,
    Cancelled,
}

/// Outcome of processing one resource from a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResourceStatus {
    AddedResource,
    UpdatedResource,
    FailedToDownloadFullResourceData,
    FailedToPutResourceToLocalStorage,
    FailedToResolveResourceConflict,
    Cancelled,
}

/// Aggregate outcome of one notes download batch
#[derive(Debug, Clone, Default)]
pub struct DownloadNotesStatus {
    pub total_new_notes: u64,
    pub total_updated_notes: u64,
    pub total_expunged_notes: u64,
    pub notes_which_failed_to_download: Vec<NoteWithError>,
    pub notes_which_failed_to_process: Vec<NoteWithError>,
    pub note_guids_which_failed_to_expunge: Vec<GuidWithError>,
    pub processed_note_guids_and_usns: HashMap<Guid, Usn>,
    pub cancelled_note_guids_and_usns: HashMap<Guid, Usn>,
    pub expunged_note_guids: Vec<Guid>,
    pub stop_synchronization_error: Option<StopSynchronizationError>,
}

/// Aggregate outcome of one resources download batch
#[derive(Debug, Clone, Default)]
pub struct DownloadResourcesStatus {
    pub total_new_resources: u64,
    pub total_updated_resources: u64,
    pub resources_which_failed_to_download: Vec<ResourceWithError>,
    pub resources_which_failed_to_process: Vec<ResourceWithError>,
    pub processed_resource_guids_and_usns: HashMap<Guid, Usn>,
    pub cancelled_resource_guids_and_usns: HashMap<Guid, Usn>,
    pub stop_synchronization_error: Option<StopSynchronizationError>,
}

/// Aggregate outcome of one scope's upload pass
///
/// Successive snapshots pushed to the send callback are monotonic: every
/// counter and failure list is non-decreasing across updates.
#[derive(Debug, Clone, Default)]
pub struct SendStatus {
    pub total_attempted_to_send_notes: u64,
    pub total_attempted_to_send_notebooks: u64,
    pub total_attempted_to_send_saved_searches: u64,
    pub total_attempted_to_send_tags: u64,
    pub total_successfully_sent_notes: u64,
    pub total_successfully_sent_notebooks: u64,
    pub total_successfully_sent_saved_searches: u64,
    pub total_successfully_sent_tags: u64,
    pub failed_to_send_notes: Vec<NoteWithError>,
    pub failed_to_send_notebooks: Vec<NotebookWithError>,
    pub failed_to_send_saved_searches: Vec<SavedSearchWithError>,
    pub failed_to_send_tags: Vec<TagWithError>,
    pub stop_synchronization_error: Option<StopSynchronizationError>,
    /// Set when a server-returned USN skipped ahead of the expected
    /// `previous_max_usn + 1`, meaning an unrelated change arrived
    /// meanwhile and an incremental sync must be repeated
    pub need_to_repeat_incremental_sync: bool,
}

/// A notebook together with the error that failed its upload
#[derive(Debug, Clone)]
pub struct NotebookWithError {
    pub notebook: eversync_core::domain::Notebook,
    pub error: Arc<anyhow::Error>,
}

/// A tag together with the error that failed its upload
#[derive(Debug, Clone)]
pub struct TagWithError {
    pub tag: eversync_core::domain::Tag,
    pub error: Arc<anyhow::Error>,
}

/// A saved search together with the error that failed its upload
#[derive(Debug, Clone)]
pub struct SavedSearchWithError {
    pub search: eversync_core::domain::SavedSearch,
    pub error: Arc<anyhow::Error>,
}

/// The overall outcome of one sync run handed back to the caller
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    pub sync_state: SyncState,
    pub user_own_download_notes_status: Option<Arc<DownloadNotesStatus>>,
    pub user_own_download_resources_status: Option<Arc<DownloadResourcesStatus>>,
    pub user_own_send_status: Option<Arc<SendStatus>>,
    pub linked_notebook_download_notes_statuses: HashMap<Guid, Arc<DownloadNotesStatus>>,
    pub linked_notebook_download_resources_statuses: HashMap<Guid, Arc<DownloadResourcesStatus>>,
    pub linked_notebook_send_statuses: HashMap<Guid, Arc<SendStatus>>,
}

/// Merges the status of a later processing stage into an earlier one
///
/// Totals are summed; per-guid maps and failure lists take the later
/// stage's entry when both saw the same guid (a note that failed in the
/// carry-over stage but succeeded against the fresh sync chunks reports
/// its final, successful outcome).
pub fn merge_download_notes_statuses(
    earlier: DownloadNotesStatus,
    later: DownloadNotesStatus,
) -> DownloadNotesStatus {
    let mut merged = earlier;

    merged.total_new_notes += later.total_new_notes;
    merged.total_updated_notes += later.total_updated_notes;
    merged.total_expunged_notes += later.total_expunged_notes;

    merged.notes_which_failed_to_download = merge_note_lists(
        merged.notes_which_failed_to_download,
        later.notes_which_failed_to_download,
    );
    merged.notes_which_failed_to_process = merge_note_lists(
        merged.notes_which_failed_to_process,
        later.notes_which_failed_to_process,
    );

    for entry in later.note_guids_which_failed_to_expunge {
        if !merged
            .note_guids_which_failed_to_expunge
            .iter()
            .any(|existing| existing.guid == entry.guid)
        {
            merged.note_guids_which_failed_to_expunge.push(entry);
        }
    }

    for (guid, usn) in later.processed_note_guids_and_usns {
        merged.processed_note_guids_and_usns.insert(guid, usn);
    }
    for (guid, usn) in later.cancelled_note_guids_and_usns {
        merged.cancelled_note_guids_and_usns.insert(guid, usn);
    }

    for guid in later.expunged_note_guids {
        if !merged.expunged_note_guids.contains(&guid) {
            merged.expunged_note_guids.push(guid);
        }
    }

    // A note that ended up fully processed must not linger in failure
    // lists from an earlier stage
    let processed = merged.processed_note_guids_and_usns.clone();
    merged
        .notes_which_failed_to_download
        .retain(|entry| entry.note.guid.as_ref().map_or(true, |g| !processed.contains_key(g)));
    merged
        .notes_which_failed_to_process
        .retain(|entry| entry.note.guid.as_ref().map_or(true, |g| !processed.contains_key(g)));

    if merged.stop_synchronization_error.is_none() {
        merged.stop_synchronization_error = later.stop_synchronization_error;
    }

    merged
}

/// Resource counterpart of [`merge_download_notes_statuses`]
pub fn merge_download_resources_statuses(
    earlier: DownloadResourcesStatus,
    later: DownloadResourcesStatus,
) -> DownloadResourcesStatus {
    let mut merged = earlier;

    merged.total_new_resources += later.total_new_resources;
    merged.total_updated_resources += later.total_updated_resources;

    merged.resources_which_failed_to_download = merge_resource_lists(
        merged.resources_which_failed_to_download,
        later.resources_which_failed_to_download,
    );
    merged.resources_which_failed_to_process = merge_resource_lists(
        merged.resources_which_failed_to_process,
        later.resources_which_failed_to_process,
    );

    for (guid, usn) in later.processed_resource_guids_and_usns {
        merged.processed_resource_guids_and_usns.insert(guid, usn);
    }
    for (guid, usn) in later.cancelled_resource_guids_and_usns {
        merged.cancelled_resource_guids_and_usns.insert(guid, usn);
    }

    let processed = merged.processed_resource_guids_and_usns.clone();
    merged.resources_which_failed_to_download.retain(|entry| {
        entry
            .resource
            .guid
            .as_ref()
            .map_or(true, |g| !processed.contains_key(g))
    });
    merged.resources_which_failed_to_process.retain(|entry| {
        entry
            .resource
            .guid
            .as_ref()
            .map_or(true, |g| !processed.contains_key(g))
    });

    if merged.stop_synchronization_error.is_none() {
        merged.stop_synchronization_error = later.stop_synchronization_error;
    }

    merged
}

fn merge_note_lists(
    earlier: Vec<NoteWithError>,
    later: Vec<NoteWithError>,
) -> Vec<NoteWithError> {
    let mut merged: Vec<NoteWithError> = earlier
        .into_iter()
        .filter(|entry| entry.note.guid.is_some())
        .collect();

    for entry in later {
        let Some(guid) = entry.note.guid.clone() else {
            continue;
        };
        if let Some(existing) = merged
            .iter_mut()
            .find(|existing| existing.note.guid.as_ref() == Some(&guid))
        {
            *existing = entry;
        } else {
            merged.push(entry);
        }
    }

    merged
}

fn merge_resource_lists(
    earlier: Vec<ResourceWithError>,
    later: Vec<ResourceWithError>,
) -> Vec<ResourceWithError> {
    let mut merged: Vec<ResourceWithError> = earlier
        .into_iter()
        .filter(|entry| entry.resource.guid.is_some())
        .collect();

    for entry in later {
        let Some(guid) = entry.resource.guid.clone() else {
            continue;
        };
        if let Some(existing) = merged
            .iter_mut()
            .find(|existing| existing.resource.guid.as_ref() == Some(&guid))
        {
            *existing = entry;
        } else {
            merged.push(entry);
        }
    }

    merged
}
