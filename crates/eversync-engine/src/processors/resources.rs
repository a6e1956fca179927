//! Resources processor
//!
//! Standalone resource entries only appear in incremental sync chunks:
//! they describe new or updated attachments of notes that are otherwise
//! unchanged. Like notes, their binary bodies are downloaded per item.
//!
//! A resource conflicts with the local state when the local copy lost its
//! note binding, belongs to a different note, or carries local edits. The
//! owning note is then duplicated locally (fresh local ids, cleared guids
//! and USNs, a conflicting title and `conflict_source_note_guid` pointing
//! back) before the incoming update proceeds against the original.

use std::sync::{Arc, Mutex};

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use eversync_conflict::ConflictNamer;
use eversync_core::domain::{Guid, LocalId, Note, Resource, SyncChunk, Usn};
use eversync_core::errors::stop_synchronization_error;
use eversync_core::ports::{FetchNoteOptions, ILocalStore, INoteStoreProvider};

use crate::chunks::utils;
use crate::status::{DownloadResourcesStatus, ProcessResourceStatus, ResourceWithError};

/// Per-item notifications from a resources batch
pub trait IResourcesProcessorCallback: Send + Sync {
    fn on_processed_resource(&self, _resource_guid: &Guid, _resource_usn: Usn) {}
    fn on_resource_failed_to_download(&self, _resource: &Resource, _error: &anyhow::Error) {}
    fn on_resource_failed_to_process(&self, _resource: &Resource, _error: &anyhow::Error) {}
    fn on_resource_processing_cancelled(&self, _resource: &Resource) {}
}

/// Processes the standalone resources of a batch of sync chunks
#[async_trait::async_trait]
pub trait IResourcesProcessor: Send + Sync {
    async fn process_resources(
        &self,
        sync_chunks: &[SyncChunk],
        canceler: CancellationToken,
        callback: Option<Arc<dyn IResourcesProcessorCallback>>,
    ) -> DownloadResourcesStatus;
}

enum ResourceKind {
    NewResource,
    UpdatedResource,
}

struct Context {
    status: Mutex<DownloadResourcesStatus>,
    canceler: CancellationToken,
    callback: Option<Arc<dyn IResourcesProcessorCallback>>,
}

pub struct ResourcesProcessor {
    local_store: Arc<dyn ILocalStore>,
    note_store_provider: Arc<dyn INoteStoreProvider>,
}

impl ResourcesProcessor {
    pub fn new(
        local_store: Arc<dyn ILocalStore>,
        note_store_provider: Arc<dyn INoteStoreProvider>,
    ) -> Self {
        Self {
            local_store,
            note_store_provider,
        }
    }

    async fn process_one_resource(
        &self,
        context: &Context,
        mut resource: Resource,
    ) -> ProcessResourceStatus {
        let guid = resource
            .guid
            .clone()
            .expect("collected sync chunk resources carry guids");

        if context.canceler.is_cancelled() {
            return cancel_resource_processing(context, &resource);
        }

        let local = match self.local_store.find_resource_by_guid(&guid, false).await {
            Ok(local) => local,
            Err(e) => {
                record_failed_to_process(context, resource, e);
                return ProcessResourceStatus::FailedToPutResourceToLocalStorage;
            }
        };

        match local {
            Some(local) => {
                context.status.lock().unwrap().total_updated_resources += 1;
                self.on_found_duplicate(context, resource, local).await
            }
            None => {
                context.status.lock().unwrap().total_new_resources += 1;

                // A brand new resource of an already synced note; resolve
                // its local note binding through the owning note
                let note_guid = resource.note_guid.clone().expect("resource has note guid");
                match self
                    .local_store
                    .find_note_by_guid(&note_guid, FetchNoteOptions::default())
                    .await
                {
                    Ok(Some(note)) => {
                        resource.note_local_id = Some(note.local_id.clone());
                        self.download_full_resource_data(
                            context,
                            resource,
                            ResourceKind::NewResource,
                        )
                        .await
                    }
                    Ok(None) => {
                        let error = anyhow::anyhow!(
                            "note owning the new resource was not found by guid {note_guid}"
                        );
                        record_failed_to_process(context, resource, error);
                        ProcessResourceStatus::FailedToPutResourceToLocalStorage
                    }
                    Err(e) => {
                        record_failed_to_process(context, resource, e);
                        ProcessResourceStatus::FailedToPutResourceToLocalStorage
                    }
                }
            }
        }
    }

    async fn on_found_duplicate(
        &self,
        context: &Context,
        mut updated_resource: Resource,
        local_resource: Resource,
    ) -> ProcessResourceStatus {
        let updated_note_guid = updated_resource
            .note_guid
            .clone()
            .expect("collected sync chunk resources carry note guids");

        let conflicting = if local_resource.note_guid.is_none() {
            // The resource might have been moved locally to a note which
            // has not been synchronized yet and hence has no guid
            debug!(
                resource_guid = ?local_resource.guid,
                "Local resource has no note guid, treating as conflict"
            );
            true
        } else if local_resource.note_guid.as_ref() != Some(&updated_note_guid) {
            debug!(
                resource_guid = ?local_resource.guid,
                "Local resource belongs to a different note than the updated resource"
            );
            true
        } else if local_resource.locally_modified {
            debug!(
                resource_local_id = %local_resource.local_id,
                "Local resource is marked as locally modified, making it a local conflict"
            );
            true
        } else {
            false
        };

        if !conflicting {
            updated_resource.local_id = local_resource.local_id.clone();
            updated_resource.note_local_id = local_resource.note_local_id.clone();
            return self
                .download_full_resource_data(context, updated_resource, ResourceKind::UpdatedResource)
                .await;
        }

        self.handle_resource_conflict(context, updated_resource, local_resource)
            .await
    }

    async fn handle_resource_conflict(
        &self,
        context: &Context,
        updated_resource: Resource,
        mut local_resource: Resource,
    ) -> ProcessResourceStatus {
        let updated_note_guid = updated_resource
            .note_guid
            .clone()
            .expect("resource has note guid");

        local_resource.local_id = LocalId::generate();
        local_resource.guid = None;
        local_resource.note_guid = None;
        local_resource.update_sequence_num = None;
        local_resource.locally_modified = true;

        let local_note = match self
            .local_store
            .find_note_by_guid(
                &updated_note_guid,
                FetchNoteOptions {
                    with_resource_metadata: true,
                    with_resource_binary_data: false,
                },
            )
            .await
        {
            Ok(Some(note)) => note,
            Ok(None) => {
                let error = anyhow::anyhow!(
                    "failed to resolve resources conflict: note owning the conflicting \
                     resource was not found by guid {updated_note_guid}"
                );
                record_failed_to_process(context, updated_resource, error);
                return ProcessResourceStatus::FailedToResolveResourceConflict;
            }
            Err(e) => {
                record_failed_to_process(context, updated_resource, e);
                return ProcessResourceStatus::FailedToResolveResourceConflict;
            }
        };

        let conflict_note = make_conflicting_note_duplicate(local_note, local_resource);

        if let Err(e) = self.local_store.put_note(conflict_note).await {
            record_failed_to_process(context, updated_resource, e);
            return ProcessResourceStatus::FailedToPutResourceToLocalStorage;
        }

        if context.canceler.is_cancelled() {
            return cancel_resource_processing(context, &updated_resource);
        }

        // The incoming update now proceeds normally against the original
        let mut updated_resource = updated_resource;
        match self
            .local_store
            .find_note_by_guid(&updated_note_guid, FetchNoteOptions::default())
            .await
        {
            Ok(Some(note)) => updated_resource.note_local_id = Some(note.local_id),
            _ => {}
        }

        self.download_full_resource_data(context, updated_resource, ResourceKind::UpdatedResource)
            .await
    }

    async fn download_full_resource_data(
        &self,
        context: &Context,
        resource: Resource,
        resource_kind: ResourceKind,
    ) -> ProcessResourceStatus {
        let guid = resource.guid.clone().expect("resource has guid");

        let note_store = match resource.note_local_id.as_ref() {
            Some(note_local_id) => {
                self.note_store_provider
                    .note_store_for_note_local_id(note_local_id)
                    .await
            }
            None => Err(anyhow::anyhow!(
                "cannot resolve note store: resource has no note local id"
            )),
        };

        let note_store = match note_store {
            Ok(note_store) => note_store,
            Err(e) => {
                record_failed_to_download(context, resource, e);
                return ProcessResourceStatus::FailedToDownloadFullResourceData;
            }
        };

        if context.canceler.is_cancelled() {
            return cancel_resource_processing(context, &resource);
        }

        let preserved_local_id = resource.local_id.clone();
        let preserved_note_local_id = resource.note_local_id.clone();

        let mut full_resource = match note_store.get_resource_with_full_data(&guid).await {
            Ok(full_resource) => full_resource,
            Err(e) => {
                let stop_error = stop_synchronization_error(&e);
                record_failed_to_download(context, resource, e);
                if let Some(stop_error) = stop_error {
                    context.status.lock().unwrap().stop_synchronization_error = Some(stop_error);
                    context.canceler.cancel();
                }
                return ProcessResourceStatus::FailedToDownloadFullResourceData;
            }
        };

        full_resource.local_id = preserved_local_id;
        full_resource.note_local_id = preserved_note_local_id;

        if context.canceler.is_cancelled() {
            return cancel_resource_processing(context, &full_resource);
        }

        self.put_resource_to_local_storage(context, full_resource, resource_kind)
            .await
    }

    async fn put_resource_to_local_storage(
        &self,
        context: &Context,
        resource: Resource,
        resource_kind: ResourceKind,
    ) -> ProcessResourceStatus {
        let guid = resource.guid.clone().expect("resource has guid");
        let usn = resource
            .update_sequence_num
            .expect("collected sync chunk resources carry USNs");

        match self.local_store.put_resource(resource.clone()).await {
            Ok(()) => {
                if let Some(callback) = context.callback.as_ref() {
                    callback.on_processed_resource(&guid, usn);
                }
                context
                    .status
                    .lock()
                    .unwrap()
                    .processed_resource_guids_and_usns
                    .insert(guid, usn);

                match resource_kind {
                    ResourceKind::NewResource => ProcessResourceStatus::AddedResource,
                    ResourceKind::UpdatedResource => ProcessResourceStatus::UpdatedResource,
                }
            }
            Err(e) => {
                warn!(%guid, error = %e, "Failed to put resource to the local store");
                record_failed_to_process(context, resource, e);
                ProcessResourceStatus::FailedToPutResourceToLocalStorage
            }
        }
    }
}

#[async_trait::async_trait]
impl IResourcesProcessor for ResourcesProcessor {
    async fn process_resources(
        &self,
        sync_chunks: &[SyncChunk],
        canceler: CancellationToken,
        callback: Option<Arc<dyn IResourcesProcessorCallback>>,
    ) -> DownloadResourcesStatus {
        debug!("ResourcesProcessor::process_resources");

        let mut resources = Vec::new();
        for chunk in sync_chunks {
            resources.extend(utils::collect_resources_from_sync_chunk(chunk));
        }

        if resources.is_empty() {
            debug!("No new/updated resources in the sync chunks");
            return DownloadResourcesStatus::default();
        }

        let context = Arc::new(Context {
            status: Mutex::new(DownloadResourcesStatus::default()),
            canceler: canceler.child_token(),
            callback,
        });

        let mut futures: Vec<BoxFuture<'_, ProcessResourceStatus>> =
            Vec::with_capacity(resources.len());

        for resource in resources {
            let context = Arc::clone(&context);
            futures
                .push(async move { self.process_one_resource(&context, resource).await }.boxed());
        }

        let _statuses = join_all(futures).await;

        let status = context.status.lock().unwrap().clone();
        status
    }
}

/// Forks the note owning a conflicting resource into a local duplicate
///
/// The duplicate gets a fresh local id, no guid/USN, a conflicting title
/// and `conflict_source_note_guid` pointing back at the original; every
/// resource of the duplicate is re-identified the same way.
fn make_conflicting_note_duplicate(mut note: Note, conflicting_resource: Resource) -> Note {
    match note.resources.as_mut() {
        Some(resources) => {
            match resources
                .iter_mut()
                .find(|r| r.local_id == conflicting_resource.local_id)
            {
                Some(existing) => *existing = conflicting_resource,
                None => resources.push(conflicting_resource),
            }
        }
        None => note.resources = Some(vec![conflicting_resource]),
    }

    let source_guid = note.guid.take();

    note.local_id = LocalId::generate();
    note.update_sequence_num = None;
    note.locally_modified = true;

    if let Some(resources) = note.resources.as_mut() {
        for resource in resources.iter_mut() {
            resource.local_id = LocalId::generate();
            resource.guid = None;
            resource.update_sequence_num = None;
            resource.note_guid = None;
            resource.note_local_id = Some(note.local_id.clone());
            resource.locally_modified = true;
        }
    }

    if let Some(source_guid) = source_guid {
        note.attributes_mut().conflict_source_note_guid = Some(source_guid);
    }

    note.title = Some(ConflictNamer::conflicting_note_title(note.title.as_deref()));

    note
}

fn cancel_resource_processing(context: &Context, resource: &Resource) -> ProcessResourceStatus {
    let guid = resource.guid.clone().expect("resource has guid");
    let usn = resource.update_sequence_num.expect("resource has USN");

    if let Some(callback) = context.callback.as_ref() {
        callback.on_resource_processing_cancelled(resource);
    }

    context
        .status
        .lock()
        .unwrap()
        .cancelled_resource_guids_and_usns
        .insert(guid, usn);

    ProcessResourceStatus::Cancelled
}

fn record_failed_to_process(context: &Context, resource: Resource, error: anyhow::Error) {
    if let Some(callback) = context.callback.as_ref() {
        callback.on_resource_failed_to_process(&resource, &error);
    }

    context
        .status
        .lock()
        .unwrap()
        .resources_which_failed_to_process
        .push(ResourceWithError {
            resource,
            error: Arc::new(error),
        });
}

fn record_failed_to_download(context: &Context, resource: Resource, error: anyhow::Error) {
    if let Some(callback) = context.callback.as_ref() {
        callback.on_resource_failed_to_download(&resource, &error);
    }

    context
        .status
        .lock()
        .unwrap()
        .resources_which_failed_to_download
        .push(ResourceWithError {
            resource,
            error: Arc::new(error),
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicting_note_duplicate_is_fully_reidentified() {
        let mut note = Note::new();
        note.guid = Some(Guid::new("n-1"));
        note.update_sequence_num = Some(4);
        note.title = Some("Sketch".into());

        let mut existing_resource = Resource::new();
        existing_resource.guid = Some(Guid::new("r-1"));
        existing_resource.note_guid = Some(Guid::new("n-1"));
        note.resources = Some(vec![existing_resource]);

        let conflicting = Resource::new();
        let original_note_local_id = note.local_id.clone();

        let duplicate = make_conflicting_note_duplicate(note, conflicting);

        assert_ne!(duplicate.local_id, original_note_local_id);
        assert!(duplicate.guid.is_none());
        assert!(duplicate.update_sequence_num.is_none());
        assert!(duplicate.locally_modified);
        assert_eq!(
            duplicate
                .attributes
                .as_ref()
                .unwrap()
                .conflict_source_note_guid,
            Some(Guid::new("n-1"))
        );
        assert!(duplicate
            .title
            .as_ref()
            .unwrap()
            .starts_with("Sketch - conflicting ("));

        let resources = duplicate.resources.as_ref().unwrap();
        assert_eq!(resources.len(), 2);
        for resource in resources {
            assert!(resource.guid.is_none());
            assert!(resource.update_sequence_num.is_none());
            assert!(resource.note_guid.is_none());
            assert_eq!(resource.note_local_id, Some(duplicate.local_id.clone()));
            assert!(resource.locally_modified);
        }
    }
}
