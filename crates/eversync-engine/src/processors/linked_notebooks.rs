//! Linked notebooks processor
//!
//! Unlike the other item processors this one never consults the conflict
//! resolver: a linked notebook is just a pointer into another account, so
//! the incoming entry always overrides the local one.

use std::sync::{Arc, Mutex};

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tracing::debug;

use eversync_core::domain::SyncChunk;
use eversync_core::ports::ILocalStore;

use crate::chunks::utils;

/// Progress notifications for one linked notebooks batch
pub trait ILinkedNotebooksProcessorCallback: Send + Sync {
    fn on_linked_notebooks_processing_progress(
        &self,
        _total_linked_notebooks: u32,
        _total_linked_notebooks_to_expunge: u32,
        _processed_linked_notebooks: u32,
        _expunged_linked_notebooks: u32,
    ) {
    }
}

/// Applies the linked notebooks of a batch of sync chunks
pub struct LinkedNotebooksProcessor {
    local_store: Arc<dyn ILocalStore>,
}

impl LinkedNotebooksProcessor {
    pub fn new(local_store: Arc<dyn ILocalStore>) -> Self {
        Self { local_store }
    }

    pub async fn process_linked_notebooks(
        &self,
        sync_chunks: &[SyncChunk],
        callback: Option<Arc<dyn ILinkedNotebooksProcessorCallback>>,
    ) -> anyhow::Result<()> {
        debug!("LinkedNotebooksProcessor::process_linked_notebooks");

        let mut linked_notebooks = Vec::new();
        let mut expunged = Vec::new();
        for chunk in sync_chunks {
            linked_notebooks.extend(utils::collect_linked_notebooks_from_sync_chunk(chunk));
            expunged.extend(utils::collect_expunged_linked_notebook_guids_from_sync_chunk(chunk));
        }

        linked_notebooks.retain(|linked_notebook| {
            linked_notebook
                .guid
                .as_ref()
                .map_or(false, |guid| !expunged.contains(guid))
        });

        if linked_notebooks.is_empty() && expunged.is_empty() {
            debug!("No new/updated/expunged linked notebooks in the sync chunks");
            return Ok(());
        }

        let total = linked_notebooks.len() as u32;
        let total_to_expunge = expunged.len() as u32;
        let counters = Arc::new(Mutex::new((0u32, 0u32)));

        let notify = |counters: &Arc<Mutex<(u32, u32)>>,
                      callback: &Option<Arc<dyn ILinkedNotebooksProcessorCallback>>| {
            if let Some(callback) = callback.as_ref() {
                let (processed, expunged_count) = *counters.lock().unwrap();
                callback.on_linked_notebooks_processing_progress(
                    total,
                    total_to_expunge,
                    processed,
                    expunged_count,
                );
            }
        };

        let mut futures: Vec<BoxFuture<'_, anyhow::Result<()>>> =
            Vec::with_capacity(linked_notebooks.len() + expunged.len());

        for linked_notebook in linked_notebooks {
            let counters = Arc::clone(&counters);
            let callback = callback.clone();
            futures.push(
                async move {
                    self.local_store.put_linked_notebook(linked_notebook).await?;
                    counters.lock().unwrap().0 += 1;
                    notify(&counters, &callback);
                    Ok(())
                }
                .boxed(),
            );
        }

        for guid in expunged {
            let counters = Arc::clone(&counters);
            let callback = callback.clone();
            futures.push(
                async move {
                    self.local_store
                        .expunge_linked_notebook_by_guid(&guid)
                        .await?;
                    counters.lock().unwrap().1 += 1;
                    notify(&counters, &callback);
                    Ok(())
                }
                .boxed(),
            );
        }

        let results = join_all(futures).await;
        results.into_iter().collect::<anyhow::Result<Vec<_>>>()?;
        Ok(())
    }
}
