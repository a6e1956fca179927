//! Durable resources processor
//!
//! The resource counterpart of the durable notes wrapper: per-item
//! outcomes are journaled under `last_sync_data/resources/` and the
//! carry-over set of a previous interrupted run (cancelled, failed to
//! download, failed to process) is retried before the fresh sync chunks.
//! Resources have no expunge stage; expunged resources arrive as note
//! updates instead.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use eversync_core::domain::{Guid, Resource, SyncChunk, Usn};

use super::journal;
use super::resources::{IResourcesProcessor, IResourcesProcessorCallback};
use crate::status::{merge_download_resources_statuses, DownloadResourcesStatus};

const LAST_SYNC_DATA_DIR: &str = "last_sync_data";
const RESOURCES_DIR: &str = "resources";
const LINKED_NOTEBOOKS_DIR: &str = "linkedNotebooks";

struct JournalingCallback {
    dir: PathBuf,
    inner: Option<Arc<dyn IResourcesProcessorCallback>>,
}

impl IResourcesProcessorCallback for JournalingCallback {
    fn on_processed_resource(&self, resource_guid: &Guid, resource_usn: Usn) {
        journal::write_processed_resource_info(resource_guid, resource_usn, &self.dir);
        if let Some(inner) = self.inner.as_ref() {
            inner.on_processed_resource(resource_guid, resource_usn);
        }
    }

    fn on_resource_failed_to_download(&self, resource: &Resource, error: &anyhow::Error) {
        journal::write_failed_to_download_resource(resource, &self.dir);
        if let Some(inner) = self.inner.as_ref() {
            inner.on_resource_failed_to_download(resource, error);
        }
    }

    fn on_resource_failed_to_process(&self, resource: &Resource, error: &anyhow::Error) {
        journal::write_failed_to_process_resource(resource, &self.dir);
        if let Some(inner) = self.inner.as_ref() {
            inner.on_resource_failed_to_process(resource, error);
        }
    }

    fn on_resource_processing_cancelled(&self, resource: &Resource) {
        journal::write_cancelled_resource(resource, &self.dir);
        if let Some(inner) = self.inner.as_ref() {
            inner.on_resource_processing_cancelled(resource);
        }
    }
}

pub struct DurableResourcesProcessor {
    resources_processor: Arc<dyn IResourcesProcessor>,
    sync_resources_dir: PathBuf,
}

impl DurableResourcesProcessor {
    pub fn new(
        resources_processor: Arc<dyn IResourcesProcessor>,
        sync_persistent_storage_dir: impl Into<PathBuf>,
    ) -> Self {
        let sync_resources_dir = sync_persistent_storage_dir
            .into()
            .join(LAST_SYNC_DATA_DIR)
            .join(RESOURCES_DIR);
        Self {
            resources_processor,
            sync_resources_dir,
        }
    }

    /// Processes resources from the sync chunks, resuming from the
    /// previous run's journal for the given scope
    pub async fn process_resources(
        &self,
        sync_chunks: &[SyncChunk],
        canceler: CancellationToken,
        linked_notebook_guid: Option<&Guid>,
        callback: Option<Arc<dyn IResourcesProcessorCallback>>,
    ) -> DownloadResourcesStatus {
        let dir = self.scope_dir(linked_notebook_guid);

        let previous_resources = resources_from_previous_sync(&dir);
        let already_processed = journal::processed_resources_info_from_last_sync(&dir);

        let filtered_chunks =
            filter_processed_resources_from_sync_chunks(sync_chunks, &already_processed);

        let journaling_callback: Arc<dyn IResourcesProcessorCallback> =
            Arc::new(JournalingCallback {
                dir: dir.clone(),
                inner: callback,
            });

        let mut status = DownloadResourcesStatus::default();

        if !previous_resources.is_empty() {
            debug!(
                count = previous_resources.len(),
                "Retrying resources carried over from the previous sync"
            );

            let mut pseudo_chunk = SyncChunk::default();
            pseudo_chunk.resources = Some(previous_resources);

            let carry_over_status = self
                .resources_processor
                .process_resources(
                    &[pseudo_chunk],
                    canceler.clone(),
                    Some(Arc::clone(&journaling_callback)),
                )
                .await;
            status = merge_download_resources_statuses(status, carry_over_status);
        }

        let chunks_status = self
            .resources_processor
            .process_resources(&filtered_chunks, canceler, Some(journaling_callback))
            .await;

        merge_download_resources_statuses(status, chunks_status)
    }

    /// Removes the journal of one scope
    pub fn cleanup(&self, linked_notebook_guid: Option<&Guid>) {
        let dir = self.scope_dir(linked_notebook_guid);
        if dir.is_dir() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!(dir = %dir.display(), error = %e, "Failed to remove resources journal dir");
            }
        }
    }

    fn scope_dir(&self, linked_notebook_guid: Option<&Guid>) -> PathBuf {
        match linked_notebook_guid {
            Some(guid) => self
                .sync_resources_dir
                .join(LINKED_NOTEBOOKS_DIR)
                .join(guid.as_str()),
            None => self.sync_resources_dir.clone(),
        }
    }
}

fn resources_from_previous_sync(dir: &Path) -> Vec<Resource> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let mut result = Vec::new();
    result.extend(journal::resources_which_failed_to_download_during_last_sync(dir));
    result.extend(journal::resources_which_failed_to_process_during_last_sync(dir));
    result.extend(journal::resources_cancelled_during_last_sync(dir));
    result
}

fn filter_processed_resources_from_sync_chunks(
    sync_chunks: &[SyncChunk],
    already_processed: &std::collections::HashMap<Guid, Usn>,
) -> Vec<SyncChunk> {
    if already_processed.is_empty() {
        return sync_chunks.to_vec();
    }

    sync_chunks
        .iter()
        .cloned()
        .map(|mut chunk| {
            if let Some(resources) = chunk.resources.as_mut() {
                resources.retain(|resource| {
                    let Some(guid) = resource.guid.as_ref() else {
                        warn!("Detected resource within sync chunks without guid, dropping it");
                        return false;
                    };
                    let Some(usn) = resource.update_sequence_num else {
                        warn!(%guid, "Detected resource within sync chunks without USN, dropping it");
                        return false;
                    };
                    match already_processed.get(guid) {
                        Some(&processed_usn) if processed_usn >= usn => {
                            debug!(
                                %guid,
                                processed_usn,
                                resource_usn = usn,
                                "Resource already processed during the previous sync, skipping it"
                            );
                            false
                        }
                        _ => true,
                    }
                });
            }
            chunk
        })
        .collect()
}
