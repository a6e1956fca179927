//! Notes processor
//!
//! Sync chunks carry only note metadata; the full content and resource
//! bodies are downloaded per note from the note store resolved for the
//! note's notebook (user-own or a linked notebook's shard). All notes of
//! a batch are processed concurrently; each item's outcome lands in a
//! shared [`DownloadNotesStatus`] behind a mutex.
//!
//! Two remote errors stop the whole batch: rate-limit reached and
//! authentication expiry. Once either is seen there is no point in letting
//! the sibling downloads run into the same failure, so the internal
//! canceler is tripped and unfinished items report `Cancelled`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use eversync_core::config::SyncOptions;
use eversync_core::domain::{Guid, LocalId, Note, SyncChunk, Usn};
use eversync_core::errors::stop_synchronization_error;
use eversync_core::ports::{
    ConflictResolution, FetchNoteOptions, IInkNoteImageDownloaderFactory, ILocalStore,
    INoteStoreProvider, INoteThumbnailDownloaderFactory, ISyncConflictResolver,
};

use crate::chunks::utils;
use crate::status::{DownloadNotesStatus, GuidWithError, NoteWithError, ProcessNoteStatus};

/// Pixel size of the note thumbnails fetched during download
const NOTE_THUMBNAIL_SIZE: u32 = 300;

/// Per-item notifications from a notes batch
///
/// The durable wrapper journals through these before forwarding them to
/// the caller, so implementations must not assume they are invoked from
/// any particular task.
pub trait INotesProcessorCallback: Send + Sync {
    fn on_processed_note(&self, _note_guid: &Guid, _note_usn: Usn) {}
    fn on_expunged_note(&self, _note_guid: &Guid) {}
    fn on_failed_to_expunge_note(&self, _note_guid: &Guid, _error: &anyhow::Error) {}
    fn on_note_failed_to_download(&self, _note: &Note, _error: &anyhow::Error) {}
    fn on_note_failed_to_process(&self, _note: &Note, _error: &anyhow::Error) {}
    fn on_note_processing_cancelled(&self, _note: &Note) {}
}

/// Processes the notes of a batch of sync chunks
#[async_trait::async_trait]
pub trait INotesProcessor: Send + Sync {
    async fn process_notes(
        &self,
        sync_chunks: &[SyncChunk],
        canceler: CancellationToken,
        callback: Option<Arc<dyn INotesProcessorCallback>>,
    ) -> DownloadNotesStatus;
}

enum NoteKind {
    NewNote,
    UpdatedNote,
}

struct Context {
    status: Mutex<DownloadNotesStatus>,
    /// Child of the caller's token; cancelling it directly is the
    /// batch-internal manual trip on stop errors
    canceler: CancellationToken,
    callback: Option<Arc<dyn INotesProcessorCallback>>,
}

pub struct NotesProcessor {
    local_store: Arc<dyn ILocalStore>,
    conflict_resolver: Arc<dyn ISyncConflictResolver>,
    note_store_provider: Arc<dyn INoteStoreProvider>,
    ink_note_image_downloader_factory: Arc<dyn IInkNoteImageDownloaderFactory>,
    note_thumbnail_downloader_factory: Arc<dyn INoteThumbnailDownloaderFactory>,
    options: SyncOptions,
}

impl NotesProcessor {
    pub fn new(
        local_store: Arc<dyn ILocalStore>,
        conflict_resolver: Arc<dyn ISyncConflictResolver>,
        note_store_provider: Arc<dyn INoteStoreProvider>,
        ink_note_image_downloader_factory: Arc<dyn IInkNoteImageDownloaderFactory>,
        note_thumbnail_downloader_factory: Arc<dyn INoteThumbnailDownloaderFactory>,
        options: SyncOptions,
    ) -> Self {
        Self {
            local_store,
            conflict_resolver,
            note_store_provider,
            ink_note_image_downloader_factory,
            note_thumbnail_downloader_factory,
            options,
        }
    }

    async fn process_one_note(&self, context: &Context, note: Note) -> ProcessNoteStatus {
        let guid = note
            .guid
            .clone()
            .expect("collected sync chunk notes carry guids");

        if context.canceler.is_cancelled() {
            return cancel_note_processing(context, &note);
        }

        let local = match self
            .local_store
            .find_note_by_guid(
                &guid,
                FetchNoteOptions {
                    with_resource_metadata: true,
                    with_resource_binary_data: false,
                },
            )
            .await
        {
            Ok(local) => local,
            Err(e) => {
                record_failed_to_process(context, note, e);
                return ProcessNoteStatus::FailedToPutNoteToLocalStorage;
            }
        };

        match local {
            Some(local) => {
                context.status.lock().unwrap().total_updated_notes += 1;
                self.on_found_duplicate(context, note, local).await
            }
            None => {
                context.status.lock().unwrap().total_new_notes += 1;
                // No duplicate by guid, download the full note data and
                // put it into the local store
                self.download_full_note_data(context, note, NoteKind::NewNote)
                    .await
            }
        }
    }

    async fn on_found_duplicate(
        &self,
        context: &Context,
        mut theirs: Note,
        mine: Note,
    ) -> ProcessNoteStatus {
        let mine_local_id = mine.local_id.clone();
        let mine_locally_favorited = mine.locally_favorited;

        debug!(
            guid = ?theirs.guid,
            local_id = %mine_local_id,
            "Found local note matching the updated note by guid"
        );

        let resolution = match self
            .conflict_resolver
            .resolve_note_conflict(theirs.clone(), mine)
            .await
        {
            Ok(resolution) => resolution,
            Err(e) => {
                record_failed_to_process(context, theirs, e);
                return ProcessNoteStatus::FailedToResolveNoteConflict;
            }
        };

        if context.canceler.is_cancelled() {
            return cancel_note_processing(context, &theirs);
        }

        match resolution {
            ConflictResolution::UseTheirs => {
                theirs.local_id = mine_local_id;
                theirs.locally_favorited = mine_locally_favorited;
                self.download_full_note_data(context, theirs, NoteKind::UpdatedNote)
                    .await
            }
            ConflictResolution::IgnoreMine => {
                self.download_full_note_data(context, theirs, NoteKind::NewNote)
                    .await
            }
            ConflictResolution::UseMine => ProcessNoteStatus::IgnoredNote,
            ConflictResolution::MoveMine(renamed_mine) => {
                if let Err(e) = self.local_store.put_note(renamed_mine.clone()).await {
                    record_failed_to_process(context, renamed_mine, e);
                    return ProcessNoteStatus::FailedToPutNoteToLocalStorage;
                }

                if context.canceler.is_cancelled() {
                    return cancel_note_processing(context, &theirs);
                }

                self.download_full_note_data(context, theirs, NoteKind::NewNote)
                    .await
            }
        }
    }

    async fn download_full_note_data(
        &self,
        context: &Context,
        note: Note,
        note_kind: NoteKind,
    ) -> ProcessNoteStatus {
        let guid = note.guid.clone().expect("note has guid");
        let notebook_guid = note
            .notebook_guid
            .clone()
            .expect("collected sync chunk notes carry notebook guids");

        debug!(
            %guid,
            %notebook_guid,
            "Downloading full note data"
        );

        let note_store = match self
            .note_store_provider
            .note_store_for_notebook_guid(&notebook_guid)
            .await
        {
            Ok(note_store) => note_store,
            Err(e) => return process_note_downloading_error(context, note, e),
        };

        if context.canceler.is_cancelled() {
            return cancel_note_processing(context, &note);
        }

        // The downloader assigns fresh local ids; the note's local id and
        // every already known resource's local id must survive
        let note_local_id = note.local_id.clone();
        let resource_local_ids: HashMap<Guid, LocalId> = note
            .resources
            .iter()
            .flatten()
            .filter_map(|resource| {
                resource
                    .guid
                    .clone()
                    .map(|guid| (guid, resource.local_id.clone()))
            })
            .collect();

        let mut full_note = match note_store.get_note_with_full_data(&guid).await {
            Ok(full_note) => full_note,
            Err(e) => return process_note_downloading_error(context, note, e),
        };

        full_note.local_id = note_local_id;
        if let Some(resources) = full_note.resources.as_mut() {
            for resource in resources.iter_mut() {
                resource.note_local_id = Some(full_note.local_id.clone());
                match resource.guid.as_ref().and_then(|g| resource_local_ids.get(g)) {
                    Some(local_id) => resource.local_id = local_id.clone(),
                    None => {
                        warn!(
                            resource_guid = ?resource.guid,
                            "Detected note resource whose metadata wasn't present \
                             before the full note data was downloaded"
                        );
                    }
                }
            }
        }

        if self.options.download_note_thumbnails
            && full_note.resources.as_ref().map_or(false, |r| !r.is_empty())
        {
            // Thumbnail download failures are tolerated, the note is
            // simply stored without one
            match self
                .download_note_thumbnail(&notebook_guid, &guid)
                .await
            {
                Ok(thumbnail) => full_note.thumbnail_data = Some(thumbnail),
                Err(e) => {
                    warn!(%guid, error = %e, "Failed to download thumbnail for note");
                }
            }
        }

        if let Some(ink_note_images_dir) = self.options.ink_note_images_storage_dir.clone() {
            if let Some(ink_resource) = full_note.ink_note_resource().cloned() {
                if let Err(e) = self
                    .download_ink_note_image(context, &notebook_guid, &ink_resource, &ink_note_images_dir)
                    .await
                {
                    // Tolerated as well, the note is saved without the raster
                    warn!(%guid, error = %e, "Failed to download ink note image for note");
                }
            }
        }

        if context.canceler.is_cancelled() {
            return cancel_note_processing(context, &full_note);
        }

        self.put_note_to_local_storage(context, full_note, note_kind)
            .await
    }

    async fn download_note_thumbnail(
        &self,
        notebook_guid: &Guid,
        note_guid: &Guid,
    ) -> anyhow::Result<Vec<u8>> {
        let downloader = self
            .note_thumbnail_downloader_factory
            .create_note_thumbnail_downloader(notebook_guid)
            .await?;
        downloader
            .download_thumbnail(note_guid, NOTE_THUMBNAIL_SIZE)
            .await
    }

    async fn download_ink_note_image(
        &self,
        context: &Context,
        notebook_guid: &Guid,
        ink_resource: &eversync_core::domain::Resource,
        ink_note_images_dir: &std::path::Path,
    ) -> anyhow::Result<()> {
        let resource_guid = ink_resource
            .guid
            .clone()
            .ok_or_else(|| anyhow::anyhow!("ink note resource has no guid"))?;
        let width = ink_resource
            .width
            .ok_or_else(|| anyhow::anyhow!("ink note resource has no width"))?;
        let height = ink_resource
            .height
            .ok_or_else(|| anyhow::anyhow!("ink note resource has no height"))?;

        std::fs::create_dir_all(ink_note_images_dir).map_err(|e| {
            anyhow::anyhow!(
                "failed to create directory for ink note images storage {}: {e}",
                ink_note_images_dir.display()
            )
        })?;

        let downloader = self
            .ink_note_image_downloader_factory
            .create_ink_note_image_downloader(notebook_guid)
            .await?;

        if context.canceler.is_cancelled() {
            anyhow::bail!("operation canceled");
        }

        let image_data = downloader
            .download_ink_note_image(&resource_guid, width, height)
            .await?;

        let file_path = ink_note_images_dir.join(format!("{resource_guid}.png"));
        std::fs::write(&file_path, image_data).map_err(|e| {
            anyhow::anyhow!(
                "failed to write downloaded ink note image {}: {e}",
                file_path.display()
            )
        })?;

        Ok(())
    }

    async fn put_note_to_local_storage(
        &self,
        context: &Context,
        note: Note,
        note_kind: NoteKind,
    ) -> ProcessNoteStatus {
        let guid = note.guid.clone().expect("note has guid");
        let usn = note
            .update_sequence_num
            .expect("collected sync chunk notes carry USNs");

        debug!(%guid, usn, "Putting downloaded note to the local store");

        match self.local_store.put_note(note.clone()).await {
            Ok(()) => {
                if let Some(callback) = context.callback.as_ref() {
                    callback.on_processed_note(&guid, usn);
                }
                context
                    .status
                    .lock()
                    .unwrap()
                    .processed_note_guids_and_usns
                    .insert(guid, usn);

                match note_kind {
                    NoteKind::NewNote => ProcessNoteStatus::AddedNote,
                    NoteKind::UpdatedNote => ProcessNoteStatus::UpdatedNote,
                }
            }
            Err(e) => {
                warn!(%guid, error = %e, "Failed to put note to the local store");
                record_failed_to_process(context, note, e);
                ProcessNoteStatus::FailedToPutNoteToLocalStorage
            }
        }
    }

    async fn expunge_one_note(&self, context: &Context, guid: Guid) -> ProcessNoteStatus {
        match self.local_store.expunge_note_by_guid(&guid).await {
            Ok(()) => {
                if let Some(callback) = context.callback.as_ref() {
                    callback.on_expunged_note(&guid);
                }
                context
                    .status
                    .lock()
                    .unwrap()
                    .expunged_note_guids
                    .push(guid);
                ProcessNoteStatus::ExpungedNote
            }
            Err(e) => {
                if let Some(callback) = context.callback.as_ref() {
                    callback.on_failed_to_expunge_note(&guid, &e);
                }
                context
                    .status
                    .lock()
                    .unwrap()
                    .note_guids_which_failed_to_expunge
                    .push(GuidWithError {
                        guid,
                        error: Arc::new(e),
                    });
                ProcessNoteStatus::FailedToExpungeNote
            }
        }
    }
}

#[async_trait::async_trait]
impl INotesProcessor for NotesProcessor {
    async fn process_notes(
        &self,
        sync_chunks: &[SyncChunk],
        canceler: CancellationToken,
        callback: Option<Arc<dyn INotesProcessorCallback>>,
    ) -> DownloadNotesStatus {
        debug!("NotesProcessor::process_notes");

        let mut notes = Vec::new();
        let mut expunged_notes = Vec::new();
        for chunk in sync_chunks {
            notes.extend(utils::collect_notes_from_sync_chunk(chunk));
            expunged_notes.extend(utils::collect_expunged_note_guids_from_sync_chunk(chunk));
        }

        notes.retain(|note| {
            note.guid
                .as_ref()
                .map_or(false, |guid| !expunged_notes.contains(guid))
        });

        if notes.is_empty() && expunged_notes.is_empty() {
            debug!("No new/updated/expunged notes in the sync chunks");
            return DownloadNotesStatus::default();
        }

        debug!(
            note_count = notes.len(),
            expunged_note_count = expunged_notes.len(),
            "Processing notes from sync chunks"
        );

        let mut status = DownloadNotesStatus::default();
        status.total_expunged_notes = expunged_notes.len() as u64;

        let context = Arc::new(Context {
            status: Mutex::new(status),
            canceler: canceler.child_token(),
            callback,
        });

        let mut futures: Vec<BoxFuture<'_, ProcessNoteStatus>> =
            Vec::with_capacity(notes.len() + expunged_notes.len());

        for note in notes {
            let context = Arc::clone(&context);
            futures.push(async move { self.process_one_note(&context, note).await }.boxed());
        }

        for guid in expunged_notes {
            let context = Arc::clone(&context);
            futures.push(async move { self.expunge_one_note(&context, guid).await }.boxed());
        }

        let _statuses = join_all(futures).await;

        let status = context.status.lock().unwrap().clone();
        status
    }
}

fn cancel_note_processing(context: &Context, note: &Note) -> ProcessNoteStatus {
    let guid = note.guid.clone().expect("note has guid");
    let usn = note.update_sequence_num.expect("note has USN");

    debug!(%guid, usn, "Note processing canceled");

    if let Some(callback) = context.callback.as_ref() {
        callback.on_note_processing_cancelled(note);
    }

    context
        .status
        .lock()
        .unwrap()
        .cancelled_note_guids_and_usns
        .insert(guid, usn);

    ProcessNoteStatus::Cancelled
}

fn record_failed_to_process(context: &Context, note: Note, error: anyhow::Error) {
    if let Some(callback) = context.callback.as_ref() {
        callback.on_note_failed_to_process(&note, &error);
    }

    context
        .status
        .lock()
        .unwrap()
        .notes_which_failed_to_process
        .push(NoteWithError {
            note,
            error: Arc::new(error),
        });
}

fn process_note_downloading_error(
    context: &Context,
    note: Note,
    error: anyhow::Error,
) -> ProcessNoteStatus {
    if let Some(callback) = context.callback.as_ref() {
        callback.on_note_failed_to_download(&note, &error);
    }

    let stop_error = stop_synchronization_error(&error);

    {
        let mut status = context.status.lock().unwrap();
        if let Some(stop_error) = stop_error {
            status.stop_synchronization_error = Some(stop_error);
        }
        status
            .notes_which_failed_to_download
            .push(NoteWithError {
                note,
                error: Arc::new(error),
            });
    }

    if stop_error.is_some() {
        // Every sibling in-flight download would hit the same condition
        context.canceler.cancel();
    }

    ProcessNoteStatus::FailedToDownloadFullNoteData
}
