//! Default conflict resolution policy
//!
//! Applies the closed set of resolutions the processors understand:
//! - `UseTheirs`: the incoming entity overwrites the local one
//! - `UseMine`: the incoming entity is dropped
//! - `IgnoreMine`: the incoming entity is treated as new
//! - `MoveMine`: the local entity is renamed out of the way first
//!
//! The policy distinguishes guid conflicts (same entity, updated remotely)
//! from name conflicts (different entities sharing a name within a scope).

use std::sync::Arc;

use tracing::debug;

use eversync_core::domain::{Note, Notebook, SavedSearch, Tag};
use eversync_core::ports::{ConflictResolution, ILocalStore, ISyncConflictResolver};

use crate::namer::ConflictNamer;

/// Upper bound on name probes before giving up on a rename
const MAX_NAME_PROBES: u32 = 1000;

/// Default implementation of the `ISyncConflictResolver` port
///
/// Uses the local store to probe candidate names for uniqueness when a
/// local entity has to be renamed out of the way.
pub struct SimpleConflictResolver {
    local_store: Arc<dyn ILocalStore>,
}

impl SimpleConflictResolver {
    pub fn new(local_store: Arc<dyn ILocalStore>) -> Self {
        Self { local_store }
    }

    async fn free_notebook_name(
        &self,
        base: &str,
        linked_notebook_guid: Option<&eversync_core::domain::Guid>,
    ) -> anyhow::Result<String> {
        for n in 0..MAX_NAME_PROBES {
            let candidate = ConflictNamer::candidate(base, n);
            if self
                .local_store
                .find_notebook_by_name(&candidate, linked_notebook_guid)
                .await?
                .is_none()
            {
                return Ok(candidate);
            }
        }
        anyhow::bail!("could not find a free conflict name for notebook \"{base}\"")
    }

    async fn free_tag_name(
        &self,
        base: &str,
        linked_notebook_guid: Option<&eversync_core::domain::Guid>,
    ) -> anyhow::Result<String> {
        for n in 0..MAX_NAME_PROBES {
            let candidate = ConflictNamer::candidate(base, n);
            if self
                .local_store
                .find_tag_by_name(&candidate, linked_notebook_guid)
                .await?
                .is_none()
            {
                return Ok(candidate);
            }
        }
        anyhow::bail!("could not find a free conflict name for tag \"{base}\"")
    }

    async fn free_saved_search_name(&self, base: &str) -> anyhow::Result<String> {
        for n in 0..MAX_NAME_PROBES {
            let candidate = ConflictNamer::candidate(base, n);
            if self
                .local_store
                .find_saved_search_by_name(&candidate)
                .await?
                .is_none()
            {
                return Ok(candidate);
            }
        }
        anyhow::bail!("could not find a free conflict name for saved search \"{base}\"")
    }
}

/// True when the two entities are the same remote entity (guids present
/// and equal), as opposed to two different entities sharing a name
fn same_remote_entity(
    theirs: &Option<eversync_core::domain::Guid>,
    mine: &Option<eversync_core::domain::Guid>,
) -> bool {
    matches!((theirs, mine), (Some(a), Some(b)) if a == b)
}

#[async_trait::async_trait]
impl ISyncConflictResolver for SimpleConflictResolver {
    async fn resolve_notebook_conflict(
        &self,
        theirs: Notebook,
        mine: Notebook,
    ) -> anyhow::Result<ConflictResolution<Notebook>> {
        if same_remote_entity(&theirs.guid, &mine.guid) {
            // Same notebook updated remotely: the service's copy wins
            debug!(guid = ?theirs.guid, "Notebook guid conflict, using theirs");
            return Ok(ConflictResolution::UseTheirs);
        }

        // Name conflict: rename the local notebook out of the way, the
        // incoming one is then processed as new
        let base = mine
            .name
            .clone()
            .ok_or_else(|| anyhow::anyhow!("conflicting notebook has no name"))?;

        let free_name = self
            .free_notebook_name(&base, mine.linked_notebook_guid.as_ref())
            .await?;

        debug!(
            old_name = %base,
            new_name = %free_name,
            "Notebook name conflict, renaming local copy"
        );

        let mut renamed = mine;
        renamed.name = Some(free_name);
        renamed.locally_modified = true;
        Ok(ConflictResolution::MoveMine(renamed))
    }

    async fn resolve_note_conflict(
        &self,
        theirs: Note,
        mine: Note,
    ) -> anyhow::Result<ConflictResolution<Note>> {
        if !same_remote_entity(&theirs.guid, &mine.guid) {
            // Notes have no per-name uniqueness; a non-guid match should
            // not have been reported as a conflict
            return Ok(ConflictResolution::IgnoreMine);
        }

        if !mine.locally_modified {
            return Ok(ConflictResolution::UseTheirs);
        }

        // The local note diverged from what the service last acknowledged.
        // Turn the local record into a conflicting note (keeping its local
        // id so the rename replaces it in place) and let the incoming note
        // come in as the canonical, new copy.
        let mut conflicting = mine;
        let source_guid = conflicting.guid.take();
        conflicting.update_sequence_num = None;
        conflicting.locally_modified = true;
        conflicting.title =
            Some(ConflictNamer::conflicting_note_title(conflicting.title.as_deref()));
        if let Some(guid) = source_guid {
            conflicting.attributes_mut().conflict_source_note_guid = Some(guid);
        }
        if let Some(resources) = conflicting.resources.as_mut() {
            for resource in resources.iter_mut() {
                resource.guid = None;
                resource.update_sequence_num = None;
                resource.note_guid = None;
                resource.note_local_id = Some(conflicting.local_id.clone());
                resource.locally_modified = true;
            }
        }

        Ok(ConflictResolution::MoveMine(conflicting))
    }

    async fn resolve_tag_conflict(
        &self,
        theirs: Tag,
        mine: Tag,
    ) -> anyhow::Result<ConflictResolution<Tag>> {
        if same_remote_entity(&theirs.guid, &mine.guid) {
            debug!(guid = ?theirs.guid, "Tag guid conflict, using theirs");
            return Ok(ConflictResolution::UseTheirs);
        }

        let base = mine
            .name
            .clone()
            .ok_or_else(|| anyhow::anyhow!("conflicting tag has no name"))?;

        let free_name = self
            .free_tag_name(&base, mine.linked_notebook_guid.as_ref())
            .await?;

        let mut renamed = mine;
        renamed.name = Some(free_name);
        renamed.locally_modified = true;
        Ok(ConflictResolution::MoveMine(renamed))
    }

    async fn resolve_saved_search_conflict(
        &self,
        theirs: SavedSearch,
        mine: SavedSearch,
    ) -> anyhow::Result<ConflictResolution<SavedSearch>> {
        if same_remote_entity(&theirs.guid, &mine.guid) {
            return Ok(ConflictResolution::UseTheirs);
        }

        let base = mine
            .name
            .clone()
            .ok_or_else(|| anyhow::anyhow!("conflicting saved search has no name"))?;

        let free_name = self.free_saved_search_name(&base).await?;

        let mut renamed = mine;
        renamed.name = Some(free_name);
        renamed.locally_modified = true;
        Ok(ConflictResolution::MoveMine(renamed))
    }
}
