//! Notebooks processor

use std::sync::{Arc, Mutex};

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tracing::debug;

use eversync_core::domain::{Notebook, SyncChunk};
use eversync_core::errors::CoreError;
use eversync_core::ports::{ConflictResolution, ILocalStore, ISyncConflictResolver};

use crate::chunks::utils;

/// Progress notifications for one notebooks batch
///
/// Counters are cumulative; the callback may be driven concurrently from
/// several item tasks and observes each transition exactly once.
pub trait INotebooksProcessorCallback: Send + Sync {
    fn on_notebooks_processing_progress(
        &self,
        _total_notebooks: u32,
        _total_notebooks_to_expunge: u32,
        _added_notebooks: u32,
        _updated_notebooks: u32,
        _expunged_notebooks: u32,
    ) {
    }
}

struct NotebookCounters {
    total_notebooks: u32,
    total_notebooks_to_expunge: u32,
    callback: Option<Arc<dyn INotebooksProcessorCallback>>,
    state: Mutex<(u32, u32, u32)>,
}

impl NotebookCounters {
    fn new(
        total_notebooks: u32,
        total_notebooks_to_expunge: u32,
        callback: Option<Arc<dyn INotebooksProcessorCallback>>,
    ) -> Self {
        Self {
            total_notebooks,
            total_notebooks_to_expunge,
            callback,
            state: Mutex::new((0, 0, 0)),
        }
    }

    fn on_added(&self) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.0 += 1;
            *state
        };
        self.notify(snapshot);
    }

    fn on_updated(&self) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.1 += 1;
            *state
        };
        self.notify(snapshot);
    }

    fn on_expunged(&self) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.2 += 1;
            *state
        };
        self.notify(snapshot);
    }

    fn notify(&self, (added, updated, expunged): (u32, u32, u32)) {
        if let Some(callback) = self.callback.as_ref() {
            callback.on_notebooks_processing_progress(
                self.total_notebooks,
                self.total_notebooks_to_expunge,
                added,
                updated,
                expunged,
            );
        }
    }
}

/// Applies the notebooks of a batch of sync chunks to the local store
pub struct NotebooksProcessor {
    local_store: Arc<dyn ILocalStore>,
    conflict_resolver: Arc<dyn ISyncConflictResolver>,
}

impl NotebooksProcessor {
    pub fn new(
        local_store: Arc<dyn ILocalStore>,
        conflict_resolver: Arc<dyn ISyncConflictResolver>,
    ) -> Self {
        Self {
            local_store,
            conflict_resolver,
        }
    }

    pub async fn process_notebooks(
        &self,
        sync_chunks: &[SyncChunk],
        callback: Option<Arc<dyn INotebooksProcessorCallback>>,
    ) -> anyhow::Result<()> {
        debug!("NotebooksProcessor::process_notebooks");

        let mut notebooks = Vec::new();
        let mut expunged_notebooks = Vec::new();
        for chunk in sync_chunks {
            notebooks.extend(utils::collect_notebooks_from_sync_chunk(chunk));
            expunged_notebooks.extend(utils::collect_expunged_notebook_guids_from_sync_chunk(
                chunk,
            ));
        }

        // The server's expunge wins over a pending update of the same guid
        notebooks.retain(|notebook| {
            notebook
                .guid
                .as_ref()
                .map_or(false, |guid| !expunged_notebooks.contains(guid))
        });

        if notebooks.is_empty() && expunged_notebooks.is_empty() {
            debug!("No new/updated/expunged notebooks in the sync chunks");
            return Ok(());
        }

        let counters = Arc::new(NotebookCounters::new(
            notebooks.len() as u32,
            expunged_notebooks.len() as u32,
            callback,
        ));

        let mut futures: Vec<BoxFuture<'_, anyhow::Result<()>>> =
            Vec::with_capacity(notebooks.len() + expunged_notebooks.len());

        for notebook in notebooks {
            let counters = Arc::clone(&counters);
            futures.push(
                async move { self.process_one_notebook(notebook, &counters).await }.boxed(),
            );
        }

        for guid in expunged_notebooks {
            let counters = Arc::clone(&counters);
            futures.push(
                async move {
                    self.local_store.expunge_notebook_by_guid(&guid).await?;
                    counters.on_expunged();
                    Ok(())
                }
                .boxed(),
            );
        }

        let results = join_all(futures).await;
        results.into_iter().collect::<anyhow::Result<Vec<_>>>()?;
        Ok(())
    }

    async fn process_one_notebook(
        &self,
        notebook: Notebook,
        counters: &NotebookCounters,
    ) -> anyhow::Result<()> {
        let guid = notebook
            .guid
            .clone()
            .ok_or_else(|| CoreError::RuntimeError("notebook without guid".into()))?;

        if let Some(local) = self.local_store.find_notebook_by_guid(&guid).await? {
            return self.on_found_duplicate(notebook, local, counters).await;
        }

        let name = notebook
            .name
            .clone()
            .ok_or_else(|| CoreError::RuntimeError("notebook without name".into()))?;

        if let Some(local) = self
            .local_store
            .find_notebook_by_name(&name, notebook.linked_notebook_guid.as_ref())
            .await?
        {
            return self.on_found_duplicate(notebook, local, counters).await;
        }

        // No duplicate by either guid or name, just insert
        self.local_store.put_notebook(notebook).await?;
        counters.on_added();
        Ok(())
    }

    async fn on_found_duplicate(
        &self,
        mut theirs: Notebook,
        mine: Notebook,
        counters: &NotebookCounters,
    ) -> anyhow::Result<()> {
        let mine_local_id = mine.local_id.clone();
        let mine_locally_favorited = mine.locally_favorited;

        let resolution = self
            .conflict_resolver
            .resolve_notebook_conflict(theirs.clone(), mine)
            .await?;

        match resolution {
            ConflictResolution::UseTheirs => {
                theirs.local_id = mine_local_id;
                theirs.locally_favorited = mine_locally_favorited;
                self.local_store.put_notebook(theirs).await?;
                counters.on_updated();
            }
            ConflictResolution::IgnoreMine => {
                self.local_store.put_notebook(theirs).await?;
                counters.on_updated();
            }
            ConflictResolution::UseMine => {}
            ConflictResolution::MoveMine(renamed) => {
                self.local_store.put_notebook(renamed).await?;
                self.local_store.put_notebook(theirs).await?;
                counters.on_added();
            }
        }

        Ok(())
    }
}
