//! Sync chunk downloader
//!
//! Repeatedly invokes the remote note store until the downloaded chunk's
//! high USN reaches the server's update count, i.e. the client is caught
//! up with the server state at the time the call began. Cancellation is
//! checked before every request; the chunks already retrieved are always
//! part of the result so the provider can persist partial progress.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use eversync_core::domain::{LinkedNotebook, SyncChunk, SyncChunkFilter, SyncMode, Usn};
use eversync_core::errors::CoreError;
use eversync_core::ports::INoteStoreProvider;

/// Chunks retrieved so far, plus the error that interrupted the download
/// when it did not run to completion
pub struct SyncChunksResult {
    pub chunks: Vec<SyncChunk>,
    pub error: Option<anyhow::Error>,
}

/// Download progress notifications
pub trait ISyncChunksDownloaderCallback: Send + Sync {
    fn on_user_own_sync_chunks_download_progress(
        &self,
        _chunk_high_usn: Usn,
        _update_count: Usn,
        _last_previous_usn: Usn,
    ) {
    }

    fn on_linked_notebook_sync_chunks_download_progress(
        &self,
        _chunk_high_usn: Usn,
        _update_count: Usn,
        _last_previous_usn: Usn,
        _linked_notebook: &LinkedNotebook,
    ) {
    }
}

/// Downloads the sequence of sync chunks for one scope
#[async_trait::async_trait]
pub trait ISyncChunksDownloader: Send + Sync {
    async fn download_sync_chunks(
        &self,
        after_usn: Usn,
        sync_mode: SyncMode,
        canceler: CancellationToken,
        callback: Option<Arc<dyn ISyncChunksDownloaderCallback>>,
    ) -> SyncChunksResult;

    async fn download_linked_notebook_sync_chunks(
        &self,
        linked_notebook: LinkedNotebook,
        after_usn: Usn,
        sync_mode: SyncMode,
        canceler: CancellationToken,
        callback: Option<Arc<dyn ISyncChunksDownloaderCallback>>,
    ) -> SyncChunksResult;
}

pub struct SyncChunksDownloader {
    note_store_provider: Arc<dyn INoteStoreProvider>,
    max_entries: i32,
}

impl SyncChunksDownloader {
    pub fn new(note_store_provider: Arc<dyn INoteStoreProvider>, max_entries: i32) -> Self {
        Self {
            note_store_provider,
            max_entries,
        }
    }
}

#[async_trait::async_trait]
impl ISyncChunksDownloader for SyncChunksDownloader {
    async fn download_sync_chunks(
        &self,
        after_usn: Usn,
        sync_mode: SyncMode,
        canceler: CancellationToken,
        callback: Option<Arc<dyn ISyncChunksDownloaderCallback>>,
    ) -> SyncChunksResult {
        debug!(after_usn, ?sync_mode, "Downloading user own sync chunks");

        let note_store = match self.note_store_provider.user_own_note_store().await {
            Ok(note_store) => note_store,
            Err(e) => {
                return SyncChunksResult {
                    chunks: Vec::new(),
                    error: Some(e),
                }
            }
        };

        let filter = SyncChunkFilter::for_user_own_sync(sync_mode);
        let last_previous_usn = after_usn;
        let mut current_after_usn = after_usn;
        let mut chunks = Vec::new();

        loop {
            if canceler.is_cancelled() {
                debug!("Sync chunks downloading was canceled");
                return SyncChunksResult {
                    chunks,
                    error: Some(CoreError::OperationCanceled.into()),
                };
            }

            let chunk = match note_store
                .get_filtered_sync_chunk(current_after_usn, self.max_entries, &filter)
                .await
            {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(error = %e, "Failed to download sync chunk");
                    return SyncChunksResult {
                        chunks,
                        error: Some(e),
                    };
                }
            };

            let Some(chunk_high_usn) = chunk.chunk_high_usn else {
                warn!("Downloaded sync chunk without chunk high USN");
                return SyncChunksResult {
                    chunks,
                    error: Some(
                        CoreError::RuntimeError("got sync chunk without chunk high USN".into())
                            .into(),
                    ),
                };
            };

            let update_count = chunk.update_count;
            chunks.push(chunk);

            if let Some(callback) = callback.as_ref() {
                callback.on_user_own_sync_chunks_download_progress(
                    chunk_high_usn,
                    update_count,
                    last_previous_usn,
                );
            }

            if chunk_high_usn >= update_count {
                debug!(chunk_high_usn, update_count, "Downloaded all sync chunks");
                return SyncChunksResult {
                    chunks,
                    error: None,
                };
            }

            current_after_usn = chunk_high_usn;
        }
    }

    async fn download_linked_notebook_sync_chunks(
        &self,
        linked_notebook: LinkedNotebook,
        after_usn: Usn,
        sync_mode: SyncMode,
        canceler: CancellationToken,
        callback: Option<Arc<dyn ISyncChunksDownloaderCallback>>,
    ) -> SyncChunksResult {
        let Some(linked_notebook_guid) = linked_notebook.guid.clone() else {
            return SyncChunksResult {
                chunks: Vec::new(),
                error: Some(
                    CoreError::InvalidArgument(
                        "cannot download linked notebook sync chunks: linked notebook has no guid"
                            .into(),
                    )
                    .into(),
                ),
            };
        };

        debug!(
            linked_notebook_guid = %linked_notebook_guid,
            after_usn,
            ?sync_mode,
            "Downloading linked notebook sync chunks"
        );

        let note_store = match self
            .note_store_provider
            .linked_notebook_note_store(&linked_notebook_guid)
            .await
        {
            Ok(note_store) => note_store,
            Err(e) => {
                return SyncChunksResult {
                    chunks: Vec::new(),
                    error: Some(e),
                }
            }
        };

        let full_sync_only = sync_mode == SyncMode::Full;
        let last_previous_usn = after_usn;
        let mut current_after_usn = after_usn;
        let mut chunks = Vec::new();

        loop {
            if canceler.is_cancelled() {
                debug!("Linked notebook sync chunks downloading was canceled");
                return SyncChunksResult {
                    chunks,
                    error: Some(CoreError::OperationCanceled.into()),
                };
            }

            let mut chunk = match note_store
                .get_linked_notebook_sync_chunk(
                    &linked_notebook,
                    current_after_usn,
                    self.max_entries,
                    full_sync_only,
                )
                .await
            {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(error = %e, "Failed to download linked notebook sync chunk");
                    return SyncChunksResult {
                        chunks,
                        error: Some(e),
                    };
                }
            };

            let Some(chunk_high_usn) = chunk.chunk_high_usn else {
                warn!("Downloaded linked notebook sync chunk without chunk high USN");
                return SyncChunksResult {
                    chunks,
                    error: Some(
                        CoreError::RuntimeError("got sync chunk without chunk high USN".into())
                            .into(),
                    ),
                };
            };

            // The server omits the linked notebook guid from its own
            // entries; processors need it for scope-aware lookups
            super::utils::set_linked_notebook_guid_to_sync_chunk_entries(
                &linked_notebook_guid,
                &mut chunk,
            );

            let update_count = chunk.update_count;
            chunks.push(chunk);

            if let Some(callback) = callback.as_ref() {
                callback.on_linked_notebook_sync_chunks_download_progress(
                    chunk_high_usn,
                    update_count,
                    last_previous_usn,
                    &linked_notebook,
                );
            }

            if chunk_high_usn >= update_count {
                return SyncChunksResult {
                    chunks,
                    error: None,
                };
            }

            current_after_usn = chunk_high_usn;
        }
    }
}
