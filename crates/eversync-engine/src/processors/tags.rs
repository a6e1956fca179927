//! Tags processor

use std::sync::{Arc, Mutex};

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tracing::debug;

use eversync_core::domain::{SyncChunk, Tag};
use eversync_core::errors::CoreError;
use eversync_core::ports::{ConflictResolution, ILocalStore, ISyncConflictResolver};

use crate::chunks::utils;

/// Progress notifications for one tags batch
pub trait ITagsProcessorCallback: Send + Sync {
    fn on_tags_processing_progress(
        &self,
        _total_tags: u32,
        _total_tags_to_expunge: u32,
        _added_tags: u32,
        _updated_tags: u32,
        _expunged_tags: u32,
    ) {
    }
}

struct TagCounters {
    total_tags: u32,
    total_tags_to_expunge: u32,
    callback: Option<Arc<dyn ITagsProcessorCallback>>,
    state: Mutex<(u32, u32, u32)>,
}

impl TagCounters {
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
            callback.on_tags_processing_progress(
                self.total_tags,
                self.total_tags_to_expunge,
                added,
                updated,
                expunged,
            );
        }
    }
}

/// Applies the tags of a batch of sync chunks to the local store
pub struct TagsProcessor {
    local_store: Arc<dyn ILocalStore>,
    conflict_resolver: Arc<dyn ISyncConflictResolver>,
}

impl TagsProcessor {
    pub fn new(
        local_store: Arc<dyn ILocalStore>,
        conflict_resolver: Arc<dyn ISyncConflictResolver>,
    ) -> Self {
        Self {
            local_store,
            conflict_resolver,
        }
    }

    pub async fn process_tags(
        &self,
        sync_chunks: &[SyncChunk],
        callback: Option<Arc<dyn ITagsProcessorCallback>>,
    ) -> anyhow::Result<()> {
        debug!("TagsProcessor::process_tags");

        let mut tags = Vec::new();
        let mut expunged_tags = Vec::new();
        for chunk in sync_chunks {
            tags.extend(utils::collect_tags_from_sync_chunk(chunk));
            expunged_tags.extend(utils::collect_expunged_tag_guids_from_sync_chunk(chunk));
        }

        tags.retain(|tag| {
            tag.guid
                .as_ref()
                .map_or(false, |guid| !expunged_tags.contains(guid))
        });

        if tags.is_empty() && expunged_tags.is_empty() {
            debug!("No new/updated/expunged tags in the sync chunks");
            return Ok(());
        }

        let counters = Arc::new(TagCounters {
            total_tags: tags.len() as u32,
            total_tags_to_expunge: expunged_tags.len() as u32,
            callback,
            state: Mutex::new((0, 0, 0)),
        });

        let mut futures: Vec<BoxFuture<'_, anyhow::Result<()>>> =
            Vec::with_capacity(tags.len() + expunged_tags.len());

        for tag in tags {
            let counters = Arc::clone(&counters);
            futures.push(async move { self.process_one_tag(tag, &counters).await }.boxed());
        }

        for guid in expunged_tags {
            let counters = Arc::clone(&counters);
            futures.push(
                async move {
                    self.local_store.expunge_tag_by_guid(&guid).await?;
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

    async fn process_one_tag(&self, tag: Tag, counters: &TagCounters) -> anyhow::Result<()> {
        let guid = tag
            .guid
            .clone()
            .ok_or_else(|| CoreError::RuntimeError("tag without guid".into()))?;

        if let Some(local) = self.local_store.find_tag_by_guid(&guid).await? {
            return self.on_found_duplicate(tag, local, counters).await;
        }

        let name = tag
            .name
            .clone()
            .ok_or_else(|| CoreError::RuntimeError("tag without name".into()))?;

        if let Some(local) = self
            .local_store
            .find_tag_by_name(&name, tag.linked_notebook_guid.as_ref())
            .await?
        {
            return self.on_found_duplicate(tag, local, counters).await;
        }

        self.local_store.put_tag(tag).await?;
        counters.on_added();
        Ok(())
    }

    async fn on_found_duplicate(
        &self,
        mut theirs: Tag,
        mine: Tag,
        counters: &TagCounters,
    ) -> anyhow::Result<()> {
        let mine_local_id = mine.local_id.clone();
        let mine_locally_favorited = mine.locally_favorited;

        let resolution = self
            .conflict_resolver
            .resolve_tag_conflict(theirs.clone(), mine)
            .await?;

        match resolution {
            ConflictResolution::UseTheirs => {
                theirs.local_id = mine_local_id;
                theirs.locally_favorited = mine_locally_favorited;
                self.local_store.put_tag(theirs).await?;
                counters.on_updated();
            }
            ConflictResolution::IgnoreMine => {
                self.local_store.put_tag(theirs).await?;
                counters.on_updated();
            }
            ConflictResolution::UseMine => {}
            ConflictResolution::MoveMine(renamed) => {
                self.local_store.put_tag(renamed).await?;
                self.local_store.put_tag(theirs).await?;
                counters.on_added();
            }
        }

        Ok(())
    }
}
