//! Saved searches processor

use std::sync::{Arc, Mutex};

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tracing::debug;

use eversync_core::domain::{SavedSearch, SyncChunk};
use eversync_core::errors::CoreError;
use eversync_core::ports::{ConflictResolution, ILocalStore, ISyncConflictResolver};

use crate::chunks::utils;

/// Progress notifications for one saved searches batch
pub trait ISavedSearchesProcessorCallback: Send + Sync {
    fn on_saved_searches_processing_progress(
        &self,
        _total_searches: u32,
        _total_searches_to_expunge: u32,
        _added_searches: u32,
        _updated_searches: u32,
        _expunged_searches: u32,
    ) {
    }
}

struct SavedSearchCounters {
    total_searches: u32,
    total_searches_to_expunge: u32,
    callback: Option<Arc<dyn ISavedSearchesProcessorCallback>>,
    state: Mutex<(u32, u32, u32)>,
}

impl SavedSearchCounters {
    fn bump(&self, which: usize) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            match which {
                0 => state.0 += 1,
                1 => state.1 += 1,
                _ => state.2 += 1,
            }
            *state
        };
        if let Some(callback) = self.callback.as_ref() {
            callback.on_saved_searches_processing_progress(
                self.total_searches,
                self.total_searches_to_expunge,
                snapshot.0,
                snapshot.1,
                snapshot.2,
            );
        }
    }
}

/// Applies the saved searches of a batch of sync chunks to the local store
///
/// Saved searches exist only in the user's own account, so there is no
/// linked-notebook scoping here.
pub struct SavedSearchesProcessor {
    local_store: Arc<dyn ILocalStore>,
    conflict_resolver: Arc<dyn ISyncConflictResolver>,
}

impl SavedSearchesProcessor {
    pub fn new(
        local_store: Arc<dyn ILocalStore>,
        conflict_resolver: Arc<dyn ISyncConflictResolver>,
    ) -> Self {
        Self {
            local_store,
            conflict_resolver,
        }
    }

    pub async fn process_saved_searches(
        &self,
        sync_chunks: &[SyncChunk],
        callback: Option<Arc<dyn ISavedSearchesProcessorCallback>>,
    ) -> anyhow::Result<()> {
        debug!("SavedSearchesProcessor::process_saved_searches");

        let mut searches = Vec::new();
        let mut expunged_searches = Vec::new();
        for chunk in sync_chunks {
            searches.extend(utils::collect_saved_searches_from_sync_chunk(chunk));
            expunged_searches.extend(utils::collect_expunged_saved_search_guids_from_sync_chunk(
                chunk,
            ));
        }

        searches.retain(|search| {
            search
                .guid
                .as_ref()
                .map_or(false, |guid| !expunged_searches.contains(guid))
        });

        if searches.is_empty() && expunged_searches.is_empty() {
            debug!("No new/updated/expunged saved searches in the sync chunks");
            return Ok(());
        }

        let counters = Arc::new(SavedSearchCounters {
            total_searches: searches.len() as u32,
            total_searches_to_expunge: expunged_searches.len() as u32,
            callback,
            state: Mutex::new((0, 0, 0)),
        });

        let mut futures: Vec<BoxFuture<'_, anyhow::Result<()>>> =
            Vec::with_capacity(searches.len() + expunged_searches.len());

        for search in searches {
            let counters = Arc::clone(&counters);
            futures.push(async move { self.process_one_search(search, &counters).await }.boxed());
        }

        for guid in expunged_searches {
            let counters = Arc::clone(&counters);
            futures.push(
                async move {
                    self.local_store.expunge_saved_search_by_guid(&guid).await?;
                    counters.bump(2);
                    Ok(())
                }
                .boxed(),
            );
        }

        let results = join_all(futures).await;
        results.into_iter().collect::<anyhow::Result<Vec<_>>>()?;
        Ok(())
    }

    async fn process_one_search(
        &self,
        search: SavedSearch,
        counters: &SavedSearchCounters,
    ) -> anyhow::Result<()> {
        let guid = search
            .guid
            .clone()
            .ok_or_else(|| CoreError::RuntimeError("saved search without guid".into()))?;

        if let Some(local) = self.local_store.find_saved_search_by_guid(&guid).await? {
            return self.on_found_duplicate(search, local, counters).await;
        }

        let name = search
            .name
            .clone()
            .ok_or_else(|| CoreError::RuntimeError("saved search without name".into()))?;

        if let Some(local) = self.local_store.find_saved_search_by_name(&name).await? {
            return self.on_found_duplicate(search, local, counters).await;
        }

        self.local_store.put_saved_search(search).await?;
        counters.bump(0);
        Ok(())
    }

    async fn on_found_duplicate(
        &self,
        mut theirs: SavedSearch,
        mine: SavedSearch,
        counters: &SavedSearchCounters,
    ) -> anyhow::Result<()> {
        let mine_local_id = mine.local_id.clone();
        let mine_locally_favorited = mine.locally_favorited;

        let resolution = self
            .conflict_resolver
            .resolve_saved_search_conflict(theirs.clone(), mine)
            .await?;

        match resolution {
            ConflictResolution::UseTheirs => {
                theirs.local_id = mine_local_id;
                theirs.locally_favorited = mine_locally_favorited;
                self.local_store.put_saved_search(theirs).await?;
                counters.bump(1);
            }
            ConflictResolution::IgnoreMine => {
                self.local_store.put_saved_search(theirs).await?;
                counters.bump(1);
            }
            ConflictResolution::UseMine => {}
            ConflictResolution::MoveMine(renamed) => {
                self.local_store.put_saved_search(renamed).await?;
                self.local_store.put_saved_search(theirs).await?;
                counters.bump(0);
            }
        }

        Ok(())
    }
}
