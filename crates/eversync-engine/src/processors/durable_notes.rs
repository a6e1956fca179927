//! Durable notes processor
//!
//! Wraps a notes processor with on-disk bookkeeping of per-item outcomes
//! so a retried sync does not repeat work:
//!
//! 1. Notes already recorded as processed with an equal-or-newer USN are
//!    removed from the incoming sync chunks, as are already expunged guids.
//! 2. The carry-over set from the previous run (cancelled, failed to
//!    download, failed to process, failed to expunge) is processed first.
//! 3. The filtered sync chunk batch runs last; statuses of all stages are
//!    merged with later stages overriding per-guid entries.
//!
//! The journal is written from the per-item callbacks before the outcome
//! is forwarded to the caller, so a crash between the two leaves the item
//! marked done rather than repeated.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use eversync_core::domain::{Guid, Note, SyncChunk, Usn};

use super::journal;
use super::notes::{INotesProcessor, INotesProcessorCallback};
use crate::status::{merge_download_notes_statuses, DownloadNotesStatus};

const LAST_SYNC_DATA_DIR: &str = "last_sync_data";
const NOTES_DIR: &str = "notes";
const LINKED_NOTEBOOKS_DIR: &str = "linkedNotebooks";

/// Journal-writing shim around the caller's callback
struct JournalingCallback {
    dir: PathBuf,
    inner: Option<Arc<dyn INotesProcessorCallback>>,
}

impl INotesProcessorCallback for JournalingCallback {
    fn on_processed_note(&self, note_guid: &Guid, note_usn: Usn) {
        journal::write_processed_note_info(note_guid, note_usn, &self.dir);
        if let Some(inner) = self.inner.as_ref() {
            inner.on_processed_note(note_guid, note_usn);
        }
    }

    fn on_expunged_note(&self, note_guid: &Guid) {
        journal::write_expunged_note(note_guid, &self.dir);
        if let Some(inner) = self.inner.as_ref() {
            inner.on_expunged_note(note_guid);
        }
    }

    fn on_failed_to_expunge_note(&self, note_guid: &Guid, error: &anyhow::Error) {
        journal::write_failed_to_expunge_note(note_guid, &self.dir);
        if let Some(inner) = self.inner.as_ref() {
            inner.on_failed_to_expunge_note(note_guid, error);
        }
    }

    fn on_note_failed_to_download(&self, note: &Note, error: &anyhow::Error) {
        journal::write_failed_to_download_note(note, &self.dir);
        if let Some(inner) = self.inner.as_ref() {
            inner.on_note_failed_to_download(note, error);
        }
    }

    fn on_note_failed_to_process(&self, note: &Note, error: &anyhow::Error) {
        journal::write_failed_to_process_note(note, &self.dir);
        if let Some(inner) = self.inner.as_ref() {
            inner.on_note_failed_to_process(note, error);
        }
    }

    fn on_note_processing_cancelled(&self, note: &Note) {
        journal::write_cancelled_note(note, &self.dir);
        if let Some(inner) = self.inner.as_ref() {
            inner.on_note_processing_cancelled(note);
        }
    }
}

pub struct DurableNotesProcessor {
    notes_processor: Arc<dyn INotesProcessor>,
    sync_notes_dir: PathBuf,
}

impl DurableNotesProcessor {
    pub fn new(
        notes_processor: Arc<dyn INotesProcessor>,
        sync_persistent_storage_dir: impl Into<PathBuf>,
    ) -> Self {
        let sync_notes_dir = sync_persistent_storage_dir
            .into()
            .join(LAST_SYNC_DATA_DIR)
            .join(NOTES_DIR);
        Self {
            notes_processor,
            sync_notes_dir,
        }
    }

    /// Processes notes from the sync chunks, resuming from the previous
    /// run's journal for the given scope
    pub async fn process_notes(
        &self,
        sync_chunks: &[SyncChunk],
        canceler: CancellationToken,
        linked_notebook_guid: Option<&Guid>,
        callback: Option<Arc<dyn INotesProcessorCallback>>,
    ) -> DownloadNotesStatus {
        let dir = self.scope_dir(linked_notebook_guid);

        // Items from the previous, interrupted run come first
        let previous_notes = notes_from_previous_sync(&dir);
        let previous_expunged_notes =
            journal::note_guids_which_failed_to_expunge_during_last_sync(&dir);

        let already_processed = journal::processed_notes_info_from_last_sync(&dir);
        let already_expunged = journal::note_guids_expunged_during_last_sync(&dir);

        let filtered_chunks = filter_processed_notes_from_sync_chunks(
            sync_chunks,
            &already_processed,
            &already_expunged,
        );

        let journaling_callback: Arc<dyn INotesProcessorCallback> = Arc::new(JournalingCallback {
            dir: dir.clone(),
            inner: callback,
        });

        let mut status = DownloadNotesStatus::default();

        if !previous_expunged_notes.is_empty() {
            debug!(
                count = previous_expunged_notes.len(),
                "Retrying expunges which failed during the previous sync"
            );

            let mut pseudo_chunk = SyncChunk::default();
            pseudo_chunk.expunged_notes = Some(previous_expunged_notes);

            let expunge_status = self
                .notes_processor
                .process_notes(
                    &[pseudo_chunk],
                    canceler.clone(),
                    Some(Arc::clone(&journaling_callback)),
                )
                .await;
            status = merge_download_notes_statuses(status, expunge_status);
        }

        if !previous_notes.is_empty() {
            debug!(
                count = previous_notes.len(),
                "Retrying notes carried over from the previous sync"
            );

            let mut pseudo_chunk = SyncChunk::default();
            pseudo_chunk.notes = Some(previous_notes);

            let carry_over_status = self
                .notes_processor
                .process_notes(
                    &[pseudo_chunk],
                    canceler.clone(),
                    Some(Arc::clone(&journaling_callback)),
                )
                .await;
            status = merge_download_notes_statuses(status, carry_over_status);
        }

        let chunks_status = self
            .notes_processor
            .process_notes(&filtered_chunks, canceler, Some(journaling_callback))
            .await;

        merge_download_notes_statuses(status, chunks_status)
    }

    /// Removes the journal of one scope, e.g. after a full sync restart
    pub fn cleanup(&self, linked_notebook_guid: Option<&Guid>) {
        let dir = self.scope_dir(linked_notebook_guid);
        if dir.is_dir() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!(dir = %dir.display(), error = %e, "Failed to remove notes journal dir");
            }
        }
    }

    fn scope_dir(&self, linked_notebook_guid: Option<&Guid>) -> PathBuf {
        match linked_notebook_guid {
            Some(guid) => self
                .sync_notes_dir
                .join(LINKED_NOTEBOOKS_DIR)
                .join(guid.as_str()),
            None => self.sync_notes_dir.clone(),
        }
    }
}

fn notes_from_previous_sync(dir: &Path) -> Vec<Note> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let mut result = Vec::new();
    result.extend(journal::notes_which_failed_to_download_during_last_sync(dir));
    result.extend(journal::notes_which_failed_to_process_during_last_sync(dir));
    result.extend(journal::notes_cancelled_during_last_sync(dir));
    result
}

/// Drops notes and expunged guids the previous run already applied
fn filter_processed_notes_from_sync_chunks(
    sync_chunks: &[SyncChunk],
    already_processed: &std::collections::HashMap<Guid, Usn>,
    already_expunged: &[Guid],
) -> Vec<SyncChunk> {
    if already_processed.is_empty() && already_expunged.is_empty() {
        return sync_chunks.to_vec();
    }

    sync_chunks
        .iter()
        .cloned()
        .map(|mut chunk| {
            if let Some(notes) = chunk.notes.as_mut() {
                notes.retain(|note| {
                    let Some(guid) = note.guid.as_ref() else {
                        warn!("Detected note within sync chunks without guid, dropping it");
                        return false;
                    };
                    let Some(usn) = note.update_sequence_num else {
                        warn!(%guid, "Detected note within sync chunks without USN, dropping it");
                        return false;
                    };
                    match already_processed.get(guid) {
                        Some(&processed_usn) if processed_usn >= usn => {
                            debug!(
                                %guid,
                                processed_usn,
                                note_usn = usn,
                                "Note already processed during the previous sync, skipping it"
                            );
                            false
                        }
                        _ => true,
                    }
                });
            }

            if let Some(expunged) = chunk.expunged_notes.as_mut() {
                expunged.retain(|guid| {
                    let already = already_expunged.contains(guid);
                    if already {
                        debug!(%guid, "Note already expunged during the previous sync, skipping it");
                    }
                    !already
                });
            }

            chunk
        })
        .collect()
}
