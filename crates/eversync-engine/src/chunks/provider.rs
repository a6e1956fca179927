//! Sync chunk provider: cache-aware chunk acquisition
//!
//! Serves stored chunks when they cover the requested range contiguously
//! from `after_usn + 1`, then asks the downloader for anything newer and
//! concatenates. Downloader results, successful or partial, go back into
//! storage; partial results are flushed to disk immediately so the next
//! run can pick up where this one stopped.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use eversync_core::domain::{LinkedNotebook, SyncChunk, SyncMode, Usn};

use super::downloader::{ISyncChunksDownloader, ISyncChunksDownloaderCallback};
use super::storage::SyncChunksStorage;
use super::utils;

pub struct SyncChunksProvider {
    downloader: Arc<dyn ISyncChunksDownloader>,
    storage: Arc<SyncChunksStorage>,
}

impl SyncChunksProvider {
    pub fn new(downloader: Arc<dyn ISyncChunksDownloader>, storage: Arc<SyncChunksStorage>) -> Self {
        Self {
            downloader,
            storage,
        }
    }

    /// Fetches all user-own sync chunks with USNs above `after_usn`
    pub async fn fetch_sync_chunks(
        &self,
        after_usn: Usn,
        sync_mode: SyncMode,
        canceler: CancellationToken,
        callback: Option<Arc<dyn ISyncChunksDownloaderCallback>>,
    ) -> anyhow::Result<Vec<SyncChunk>> {
        let ranges = self.storage.fetch_user_own_usn_ranges();

        if !stored_ranges_start_right_after(&ranges, after_usn) {
            // Nothing cached for the range we are looking for
            return self
                .download_and_store(after_usn, sync_mode, canceler, callback, None)
                .await;
        }

        let stored_chunks = self.storage.fetch_relevant_user_own_chunks(after_usn);

        // The cached set can still be incomplete despite the range check:
        // the storage may have failed to read or deserialize some of the
        // chunk files. Re-derive the overall range from what actually
        // deserialized.
        let Some((chunks_low_usn, chunks_high_usn)) = overall_usn_range(&stored_chunks) else {
            warn!("Failed to determine overall USN range of stored sync chunks");
            return self
                .download_and_store(after_usn, sync_mode, canceler, callback, None)
                .await;
        };

        if after_usn != 0 && chunks_low_usn != after_usn + 1 {
            return self
                .download_and_store(after_usn, sync_mode, canceler, callback, None)
                .await;
        }

        debug!(
            after_usn,
            chunks_low_usn,
            chunks_high_usn,
            "Serving stored sync chunks, downloading the newer tail"
        );

        self.download_and_store(chunks_high_usn, sync_mode, canceler, callback, None)
            .await
            .map(|downloaded| {
                let mut result = stored_chunks;
                result.extend(downloaded);
                result
            })
    }

    /// Linked-notebook variant of [`SyncChunksProvider::fetch_sync_chunks`]
    pub async fn fetch_linked_notebook_sync_chunks(
        &self,
        linked_notebook: LinkedNotebook,
        after_usn: Usn,
        sync_mode: SyncMode,
        canceler: CancellationToken,
        callback: Option<Arc<dyn ISyncChunksDownloaderCallback>>,
    ) -> anyhow::Result<Vec<SyncChunk>> {
        let Some(linked_notebook_guid) = linked_notebook.guid.clone() else {
            anyhow::bail!("cannot fetch linked notebook sync chunks: linked notebook guid is empty");
        };

        let ranges = self
            .storage
            .fetch_linked_notebook_usn_ranges(&linked_notebook_guid);

        if !stored_ranges_start_right_after(&ranges, after_usn) {
            return self
                .download_and_store(
                    after_usn,
                    sync_mode,
                    canceler,
                    callback,
                    Some(linked_notebook),
                )
                .await;
        }

        let stored_chunks = self
            .storage
            .fetch_relevant_linked_notebook_chunks(&linked_notebook_guid, after_usn);

        let Some((chunks_low_usn, chunks_high_usn)) = overall_usn_range(&stored_chunks) else {
            warn!(
                linked_notebook_guid = %linked_notebook_guid,
                "Failed to determine overall USN range of stored sync chunks"
            );
            return self
                .download_and_store(
                    after_usn,
                    sync_mode,
                    canceler,
                    callback,
                    Some(linked_notebook),
                )
                .await;
        };

        if after_usn != 0 && chunks_low_usn != after_usn + 1 {
            return self
                .download_and_store(
                    after_usn,
                    sync_mode,
                    canceler,
                    callback,
                    Some(linked_notebook),
                )
                .await;
        }

        self.download_and_store(
            chunks_high_usn,
            sync_mode,
            canceler,
            callback,
            Some(linked_notebook),
        )
        .await
        .map(|downloaded| {
            let mut result = stored_chunks;
            result.extend(downloaded);
            result
        })
    }

    async fn download_and_store(
        &self,
        after_usn: Usn,
        sync_mode: SyncMode,
        canceler: CancellationToken,
        callback: Option<Arc<dyn ISyncChunksDownloaderCallback>>,
        linked_notebook: Option<LinkedNotebook>,
    ) -> anyhow::Result<Vec<SyncChunk>> {
        let linked_notebook_guid = linked_notebook
            .as_ref()
            .and_then(|lnb| lnb.guid.clone());

        let result = match linked_notebook {
            Some(linked_notebook) => {
                self.downloader
                    .download_linked_notebook_sync_chunks(
                        linked_notebook,
                        after_usn,
                        sync_mode,
                        canceler,
                        callback,
                    )
                    .await
            }
            None => {
                self.downloader
                    .download_sync_chunks(after_usn, sync_mode, canceler, callback)
                    .await
            }
        };

        match result.error {
            None => {
                if !result.chunks.is_empty() {
                    match linked_notebook_guid.as_ref() {
                        Some(guid) => self
                            .storage
                            .put_linked_notebook_chunks(guid, result.chunks.clone()),
                        None => self.storage.put_user_own_chunks(result.chunks.clone()),
                    }
                }
                Ok(result.chunks)
            }
            Some(error) => {
                // Persist partial progress so the next sync can resume
                // from it instead of re-downloading
                if !result.chunks.is_empty() {
                    match linked_notebook_guid.as_ref() {
                        Some(guid) => self
                            .storage
                            .put_linked_notebook_chunks(guid, result.chunks),
                        None => self.storage.put_user_own_chunks(result.chunks),
                    }
                    self.storage.flush();
                }
                Err(error)
            }
        }
    }
}

/// True when some stored range begins exactly at `after_usn + 1`
/// (or, for `after_usn == 0`, when any range is stored at all)
fn stored_ranges_start_right_after(ranges: &[(Usn, Usn)], after_usn: Usn) -> bool {
    let next = ranges.iter().find(|&&(lo, _)| lo > after_usn);
    match next {
        None => false,
        Some(&(lo, _)) => after_usn == 0 || lo == after_usn + 1,
    }
}

/// The overall `(low, high)` range covered by a set of chunks
fn overall_usn_range(chunks: &[SyncChunk]) -> Option<(Usn, Usn)> {
    let mut low: Option<Usn> = None;
    let mut high: Option<Usn> = None;

    for chunk in chunks {
        let chunk_high = chunk.chunk_high_usn?;
        let chunk_low = utils::sync_chunk_low_usn(chunk)?;

        if low.map_or(true, |current| current > chunk_low) {
            low = Some(chunk_low);
        }
        if high.map_or(true, |current| current < chunk_high) {
            high = Some(chunk_high);
        }
    }

    low.zip(high)
}
