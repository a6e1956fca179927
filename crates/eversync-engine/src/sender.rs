//! Sender: uploads locally modified entities
//!
//! Collects everything flagged `locally_modified` from the local store and
//! sends it in an order that respects dependencies:
//!
//! - saved searches have none;
//! - a tag waits for its parent: a locally-new parent that fails to send
//!   takes all of its descendants down with it, while a failed update of
//!   an already-remote parent does not (the child only needs the parent's
//!   guid, which is known);
//! - notebooks are independent;
//! - a note waits for its notebook's guid, and is sent without the
//!   binding to any new tag that failed (staying locally modified so a
//!   future sync retries the binding).
//!
//! Every USN returned by the service is checked against the expected
//! `previous_max_usn + 1`; a gap means some unrelated change arrived on
//! the server meanwhile and the engine must repeat the incremental sync.
//!
//! Rate-limit and auth-expiry errors stop the affected scope: its
//! remaining uploads short-circuit into the failed lists. Other scopes
//! proceed independently.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use eversync_core::domain::{Guid, LocalId, Note, Notebook, SavedSearch, SyncState, Tag, Usn};
use eversync_core::errors::{stop_synchronization_error, StopSynchronizationError};
use eversync_core::ports::{
    ILocalStore, INoteStore, INoteStoreProvider, ISyncStateStorage, ListFilter,
};

use crate::status::{
    NotebookWithError, NoteWithError, SavedSearchWithError, SendStatus, TagWithError,
};

/// Send progress notifications, one snapshot per processed item
pub trait ISenderCallback: Send + Sync {
    fn on_user_own_send_status_update(&self, _status: Arc<SendStatus>) {}
    fn on_linked_notebook_send_status_update(
        &self,
        _linked_notebook_guid: &Guid,
        _status: Arc<SendStatus>,
    ) {
    }
}

/// Everything one send pass produced
#[derive(Debug)]
pub struct SenderOutput {
    pub user_own_status: Arc<SendStatus>,
    pub linked_notebook_statuses: HashMap<Guid, Arc<SendStatus>>,
    pub sync_state: SyncState,
}

/// How a tag of the current batch fared, for its descendants' sake
#[derive(Debug, Clone)]
enum TagSendOutcome {
    Sent { guid: Guid },
    /// The tag was new on the service and failed; descendants cannot be
    /// sent at all
    FailedNew,
    /// The tag already had a guid and only its update failed; descendants
    /// can still bind to it
    FailedExisting { guid: Guid },
}

/// Entities of one scope, collected from the local store
#[derive(Default)]
struct ScopeItems {
    searches: Vec<SavedSearch>,
    tags: Vec<Tag>,
    notebooks: Vec<Notebook>,
    notes: Vec<Note>,
}

/// Mutable per-scope send state shared by the per-kind passes
struct ScopeState {
    linked_notebook_guid: Option<Guid>,
    status: Mutex<SendStatus>,
    /// Largest USN observed so far; starts from the sync state's counter
    last_usn: Mutex<Usn>,
    /// Latched on rate-limit or auth-expiry; remaining uploads
    /// short-circuit once set
    stopped: Mutex<bool>,
    canceler: CancellationToken,
    callback: Option<Arc<dyn ISenderCallback>>,
}

impl ScopeState {
    fn push_snapshot(&self) {
        if let Some(callback) = self.callback.as_ref() {
            let snapshot = Arc::new(self.status.lock().unwrap().clone());
            match self.linked_notebook_guid.as_ref() {
                Some(guid) => callback.on_linked_notebook_send_status_update(guid, snapshot),
                None => callback.on_user_own_send_status_update(snapshot),
            }
        }
    }

    fn observe_usn(&self, usn: Usn) {
        let mut last_usn = self.last_usn.lock().unwrap();
        if *last_usn > 0 && usn != *last_usn + 1 {
            debug!(
                expected = *last_usn + 1,
                received = usn,
                "Server-assigned USN skipped ahead, incremental sync needs repeating"
            );
            self.status.lock().unwrap().need_to_repeat_incremental_sync = true;
        }
        if usn > *last_usn {
            *last_usn = usn;
        }
    }

    /// True when this scope must not attempt further uploads
    fn short_circuited(&self) -> bool {
        *self.stopped.lock().unwrap() || self.canceler.is_cancelled()
    }

    /// Records a failure; stop-class errors latch the scope's stop flag
    fn note_send_error(&self, error: &anyhow::Error) {
        if let Some(stop_error) = stop_synchronization_error(error) {
            self.status.lock().unwrap().stop_synchronization_error = Some(stop_error);
            *self.stopped.lock().unwrap() = true;
        }
    }

    /// The error recorded for items skipped after the scope stopped
    fn skipped_item_error(&self) -> anyhow::Error {
        match self.status.lock().unwrap().stop_synchronization_error {
            Some(StopSynchronizationError::RateLimitReached { duration_seconds }) => {
                anyhow::anyhow!(
                    "sending stopped: rate limit reached (retry after {duration_seconds:?} seconds)"
                )
            }
            Some(StopSynchronizationError::AuthenticationExpired) => {
                anyhow::anyhow!("sending stopped: authentication expired")
            }
            None => anyhow::anyhow!("sending stopped: operation canceled"),
        }
    }
}

pub struct Sender {
    local_store: Arc<dyn ILocalStore>,
    sync_state_storage: Arc<dyn ISyncStateStorage>,
    note_store_provider: Arc<dyn INoteStoreProvider>,
}

impl Sender {
    pub fn new(
        local_store: Arc<dyn ILocalStore>,
        sync_state_storage: Arc<dyn ISyncStateStorage>,
        note_store_provider: Arc<dyn INoteStoreProvider>,
    ) -> Self {
        Self {
            local_store,
            sync_state_storage,
            note_store_provider,
        }
    }

    /// Uploads all locally modified entities and reports the per-scope
    /// outcome along with the updated sync state
    pub async fn send(
        &self,
        canceler: CancellationToken,
        callback: Option<Arc<dyn ISenderCallback>>,
    ) -> anyhow::Result<SenderOutput> {
        debug!("Sender::send");

        let previous_sync_state = self.sync_state_storage.get_sync_state().await?;

        let filter = ListFilter {
            locally_modified_only: true,
        };
        let searches = self.local_store.list_saved_searches(filter).await?;
        let tags = self.local_store.list_tags(filter).await?;
        let notebooks = self.local_store.list_notebooks(filter).await?;
        let notes = self.local_store.list_notes(filter).await?;

        let mut scopes: HashMap<Option<Guid>, ScopeItems> = HashMap::new();

        // Saved searches exist only in the user's own account
        if !searches.is_empty() {
            scopes.entry(None).or_default().searches = searches;
        }

        for tag in tags {
            scopes
                .entry(tag.linked_notebook_guid.clone())
                .or_default()
                .tags
                .push(tag);
        }
        for notebook in notebooks {
            scopes
                .entry(notebook.linked_notebook_guid.clone())
                .or_default()
                .notebooks
                .push(notebook);
        }

        // A note belongs to the scope of its notebook
        for note in notes {
            let scope = match self
                .local_store
                .find_notebook_by_note_local_id(&note.local_id)
                .await?
            {
                Some(notebook) => notebook.linked_notebook_guid,
                None => {
                    warn!(
                        note_local_id = %note.local_id,
                        "Cannot resolve the notebook of a locally modified note, \
                         sending it within the user own scope"
                    );
                    None
                }
            };
            scopes.entry(scope).or_default().notes.push(note);
        }

        // Scopes are independent and run concurrently; ordering matters
        // only within a scope
        let mut scope_futures: Vec<BoxFuture<'_, (Option<Guid>, SendStatus, Usn)>> = Vec::new();
        for (linked_notebook_guid, items) in scopes {
            let baseline_usn = match linked_notebook_guid.as_ref() {
                Some(guid) => previous_sync_state
                    .linked_notebook_update_counts
                    .get(guid)
                    .copied()
                    .unwrap_or(0),
                None => previous_sync_state.user_data_update_count,
            };
            let canceler = canceler.clone();
            let callback = callback.clone();
            scope_futures.push(
                async move {
                    self.send_scope(linked_notebook_guid, items, baseline_usn, canceler, callback)
                        .await
                }
                .boxed(),
            );
        }

        let scope_results = join_all(scope_futures).await;

        let now = Utc::now().timestamp_millis();
        let mut sync_state = previous_sync_state;
        let mut user_own_status = Arc::new(SendStatus::default());
        let mut linked_notebook_statuses = HashMap::new();

        for (linked_notebook_guid, status, last_usn) in scope_results {
            match linked_notebook_guid {
                Some(guid) => {
                    sync_state
                        .linked_notebook_update_counts
                        .insert(guid.clone(), last_usn);
                    sync_state
                        .linked_notebook_last_sync_times
                        .insert(guid.clone(), now);
                    linked_notebook_statuses.insert(guid, Arc::new(status));
                }
                None => {
                    sync_state.user_data_update_count = last_usn;
                    sync_state.user_data_last_sync_time = now;
                    user_own_status = Arc::new(status);
                }
            }
        }

        self.sync_state_storage
            .set_sync_state(sync_state.clone())
            .await?;

        Ok(SenderOutput {
            user_own_status,
            linked_notebook_statuses,
            sync_state,
        })
    }

    async fn send_scope(
        &self,
        linked_notebook_guid: Option<Guid>,
        items: ScopeItems,
        baseline_usn: Usn,
        canceler: CancellationToken,
        callback: Option<Arc<dyn ISenderCallback>>,
    ) -> (Option<Guid>, SendStatus, Usn) {
        let state = ScopeState {
            linked_notebook_guid: linked_notebook_guid.clone(),
            status: Mutex::new(SendStatus::default()),
            last_usn: Mutex::new(baseline_usn),
            stopped: Mutex::new(false),
            canceler,
            callback,
        };

        let note_store = match linked_notebook_guid.as_ref() {
            Some(guid) => self.note_store_provider.linked_notebook_note_store(guid).await,
            None => self.note_store_provider.user_own_note_store().await,
        };

        let note_store = match note_store {
            Ok(note_store) => note_store,
            Err(e) => {
                warn!(
                    ?linked_notebook_guid,
                    error = %e,
                    "Failed to resolve the note store for a send scope"
                );
                fail_whole_scope(&state, items, &e);
                let last_usn = *state.last_usn.lock().unwrap();
                return (
                    linked_notebook_guid,
                    state.status.into_inner().unwrap(),
                    last_usn,
                );
            }
        };

        self.send_saved_searches(&state, note_store.as_ref(), items.searches)
            .await;
        let tag_outcomes = self.send_tags(&state, note_store.as_ref(), items.tags).await;
        self.send_notebooks(&state, note_store.as_ref(), items.notebooks)
            .await;
        self.send_notes(&state, note_store.as_ref(), items.notes, &tag_outcomes)
            .await;

        let last_usn = *state.last_usn.lock().unwrap();
        (
            linked_notebook_guid,
            state.status.into_inner().unwrap(),
            last_usn,
        )
    }

    async fn send_saved_searches(
        &self,
        state: &ScopeState,
        note_store: &dyn INoteStore,
        searches: Vec<SavedSearch>,
    ) {
        for search in searches {
            state.status.lock().unwrap().total_attempted_to_send_saved_searches += 1;

            if state.short_circuited() {
                record_failed_search(state, search, state.skipped_item_error());
                state.push_snapshot();
                continue;
            }

            let outcome = self.send_one_saved_search(state, note_store, search.clone()).await;
            match outcome {
                Ok(()) => {
                    state.status.lock().unwrap().total_successfully_sent_saved_searches += 1;
                }
                Err(e) => {
                    state.note_send_error(&e);
                    record_failed_search(state, search, e);
                }
            }
            state.push_snapshot();
        }
    }

    async fn send_one_saved_search(
        &self,
        state: &ScopeState,
        note_store: &dyn INoteStore,
        search: SavedSearch,
    ) -> anyhow::Result<()> {
        let local_id = search.local_id.clone();
        let locally_favorited = search.locally_favorited;

        let mut acknowledged = if search.guid.is_none() {
            note_store.create_saved_search(search).await?
        } else {
            let mut search = search;
            let usn = note_store.update_saved_search(search.clone()).await?;
            search.update_sequence_num = Some(usn);
            search
        };

        if let Some(usn) = acknowledged.update_sequence_num {
            state.observe_usn(usn);
        }

        acknowledged.local_id = local_id;
        acknowledged.locally_favorited = locally_favorited;
        acknowledged.locally_modified = false;
        self.local_store.put_saved_search(acknowledged).await?;
        Ok(())
    }

    /// Sends the scope's tags, parents strictly before children
    async fn send_tags(
        &self,
        state: &ScopeState,
        note_store: &dyn INoteStore,
        tags: Vec<Tag>,
    ) -> HashMap<LocalId, TagSendOutcome> {
        let mut outcomes: HashMap<LocalId, TagSendOutcome> = HashMap::new();
        if tags.is_empty() {
            return outcomes;
        }

        let in_batch: HashSet<LocalId> = tags.iter().map(|t| t.local_id.clone()).collect();
        let mut pending: Vec<Tag> = tags;

        while !pending.is_empty() {
            let mut deferred = Vec::new();
            let mut progressed = false;

            for mut tag in pending {
                // Hold the tag back until its in-batch parent's fate is known
                if let Some(parent_local_id) = tag.parent_tag_local_id.clone() {
                    if in_batch.contains(&parent_local_id)
                        && !outcomes.contains_key(&parent_local_id)
                    {
                        deferred.push(tag);
                        continue;
                    }

                    match outcomes.get(&parent_local_id) {
                        Some(TagSendOutcome::Sent { guid }) => {
                            tag.parent_guid = Some(guid.clone());
                        }
                        Some(TagSendOutcome::FailedNew) => {
                            // The parent does not exist on the service;
                            // this whole subtree is skipped
                            progressed = true;
                            let outcome = failed_tag_outcome(&tag);
                            let local_id = tag.local_id.clone();
                            state.status.lock().unwrap().total_attempted_to_send_tags += 1;
                            record_failed_tag(
                                state,
                                tag,
                                anyhow::anyhow!("cannot send tag: failed to send its parent tag"),
                            );
                            state.push_snapshot();
                            outcomes.insert(local_id, outcome);
                            continue;
                        }
                        Some(TagSendOutcome::FailedExisting { .. }) | None => {
                            // The parent's guid is already known remotely;
                            // the child can be sent regardless
                        }
                    }
                }

                progressed = true;
                state.status.lock().unwrap().total_attempted_to_send_tags += 1;

                if state.short_circuited() {
                    let outcome = failed_tag_outcome(&tag);
                    let local_id = tag.local_id.clone();
                    record_failed_tag(state, tag, state.skipped_item_error());
                    state.push_snapshot();
                    outcomes.insert(local_id, outcome);
                    continue;
                }

                let local_id = tag.local_id.clone();
                match self.send_one_tag(state, note_store, tag.clone()).await {
                    Ok(guid) => {
                        state.status.lock().unwrap().total_successfully_sent_tags += 1;
                        outcomes.insert(local_id, TagSendOutcome::Sent { guid });
                    }
                    Err(e) => {
                        state.note_send_error(&e);
                        let outcome = failed_tag_outcome(&tag);
                        record_failed_tag(state, tag, e);
                        outcomes.insert(local_id, outcome);
                    }
                }
                state.push_snapshot();
            }

            if !progressed && !deferred.is_empty() {
                // Parent cycle within the batch; cycles are forbidden by
                // the data model so report the leftovers as failed
                for tag in deferred {
                    let outcome = failed_tag_outcome(&tag);
                    let local_id = tag.local_id.clone();
                    state.status.lock().unwrap().total_attempted_to_send_tags += 1;
                    record_failed_tag(
                        state,
                        tag,
                        anyhow::anyhow!("cannot send tag: parent tag cycle detected"),
                    );
                    state.push_snapshot();
                    outcomes.insert(local_id, outcome);
                }
                break;
            }

            pending = deferred;
        }

        outcomes
    }

    async fn send_one_tag(
        &self,
        state: &ScopeState,
        note_store: &dyn INoteStore,
        tag: Tag,
    ) -> anyhow::Result<Guid> {
        let local_id = tag.local_id.clone();
        let parent_tag_local_id = tag.parent_tag_local_id.clone();
        let linked_notebook_guid = tag.linked_notebook_guid.clone();
        let locally_favorited = tag.locally_favorited;

        let mut acknowledged = if tag.guid.is_none() {
            note_store.create_tag(tag).await?
        } else {
            let mut tag = tag;
            let usn = note_store.update_tag(tag.clone()).await?;
            tag.update_sequence_num = Some(usn);
            tag
        };

        if let Some(usn) = acknowledged.update_sequence_num {
            state.observe_usn(usn);
        }

        let guid = acknowledged
            .guid
            .clone()
            .ok_or_else(|| anyhow::anyhow!("service acknowledged a tag without a guid"))?;

        acknowledged.local_id = local_id;
        acknowledged.parent_tag_local_id = parent_tag_local_id;
        acknowledged.linked_notebook_guid = linked_notebook_guid;
        acknowledged.locally_favorited = locally_favorited;
        acknowledged.locally_modified = false;
        self.local_store.put_tag(acknowledged).await?;

        Ok(guid)
    }

    async fn send_notebooks(
        &self,
        state: &ScopeState,
        note_store: &dyn INoteStore,
        notebooks: Vec<Notebook>,
    ) {
        for notebook in notebooks {
            state.status.lock().unwrap().total_attempted_to_send_notebooks += 1;

            if state.short_circuited() {
                record_failed_notebook(state, notebook, state.skipped_item_error());
                state.push_snapshot();
                continue;
            }

            match self
                .send_one_notebook(state, note_store, notebook.clone())
                .await
            {
                Ok(()) => {
                    state.status.lock().unwrap().total_successfully_sent_notebooks += 1;
                }
                Err(e) => {
                    state.note_send_error(&e);
                    record_failed_notebook(state, notebook, e);
                }
            }
            state.push_snapshot();
        }
    }

    async fn send_one_notebook(
        &self,
        state: &ScopeState,
        note_store: &dyn INoteStore,
        notebook: Notebook,
    ) -> anyhow::Result<()> {
        let local_id = notebook.local_id.clone();
        let linked_notebook_guid = notebook.linked_notebook_guid.clone();
        let locally_favorited = notebook.locally_favorited;

        let mut acknowledged = if notebook.guid.is_none() {
            note_store.create_notebook(notebook).await?
        } else {
            let mut notebook = notebook;
            let usn = note_store.update_notebook(notebook.clone()).await?;
            notebook.update_sequence_num = Some(usn);
            notebook
        };

        if let Some(usn) = acknowledged.update_sequence_num {
            state.observe_usn(usn);
        }

        acknowledged.local_id = local_id;
        acknowledged.linked_notebook_guid = linked_notebook_guid;
        acknowledged.locally_favorited = locally_favorited;
        acknowledged.locally_modified = false;
        self.local_store.put_notebook(acknowledged).await?;
        Ok(())
    }

    async fn send_notes(
        &self,
        state: &ScopeState,
        note_store: &dyn INoteStore,
        notes: Vec<Note>,
        tag_outcomes: &HashMap<LocalId, TagSendOutcome>,
    ) {
        for note in notes {
            state.status.lock().unwrap().total_attempted_to_send_notes += 1;

            if state.short_circuited() {
                record_failed_note(state, note, state.skipped_item_error());
                state.push_snapshot();
                continue;
            }

            match self
                .send_one_note(state, note_store, note.clone(), tag_outcomes)
                .await
            {
                Ok(()) => {
                    state.status.lock().unwrap().total_successfully_sent_notes += 1;
                }
                Err(e) => {
                    state.note_send_error(&e);
                    record_failed_note(state, note, e);
                }
            }
            state.push_snapshot();
        }
    }

    async fn send_one_note(
        &self,
        state: &ScopeState,
        note_store: &dyn INoteStore,
        mut note: Note,
        tag_outcomes: &HashMap<LocalId, TagSendOutcome>,
    ) -> anyhow::Result<()> {
        // A note cannot be sent until its notebook exists on the service
        if note.notebook_guid.is_none() {
            let notebook = self
                .local_store
                .find_notebook_by_note_local_id(&note.local_id)
                .await?;
            match notebook.and_then(|notebook| notebook.guid) {
                Some(guid) => note.notebook_guid = Some(guid),
                None => anyhow::bail!(
                    "cannot send note: its notebook has not been synchronized yet"
                ),
            }
        }

        let local_id = note.local_id.clone();
        let notebook_local_id = note.notebook_local_id.clone();
        let all_tag_local_ids = note.tag_local_ids.clone();
        let locally_favorited = note.locally_favorited;

        // Bindings to tags sent in this batch become guid bindings; a
        // binding to a new tag that failed is dropped from the outgoing
        // copy and retried on a future sync
        let mut keep_locally_modified = false;
        let mut outgoing_tag_local_ids = Vec::with_capacity(note.tag_local_ids.len());
        for tag_local_id in note.tag_local_ids.drain(..) {
            match tag_outcomes.get(&tag_local_id) {
                Some(TagSendOutcome::Sent { guid })
                | Some(TagSendOutcome::FailedExisting { guid }) => {
                    if !note.tag_guids.contains(guid) {
                        note.tag_guids.push(guid.clone());
                    }
                    outgoing_tag_local_ids.push(tag_local_id);
                }
                Some(TagSendOutcome::FailedNew) => {
                    keep_locally_modified = true;
                }
                None => outgoing_tag_local_ids.push(tag_local_id),
            }
        }
        note.tag_local_ids = outgoing_tag_local_ids;

        let mut acknowledged = if note.guid.is_none() {
            note_store.create_note(note).await?
        } else {
            note_store.update_note(note).await?
        };

        if let Some(usn) = acknowledged.update_sequence_num {
            state.observe_usn(usn);
        }

        acknowledged.local_id = local_id;
        acknowledged.notebook_local_id = notebook_local_id;
        acknowledged.tag_local_ids = all_tag_local_ids;
        acknowledged.locally_favorited = locally_favorited;
        acknowledged.locally_modified = keep_locally_modified;
        self.local_store.put_note(acknowledged).await?;
        Ok(())
    }
}

fn failed_tag_outcome(tag: &Tag) -> TagSendOutcome {
    match tag.guid.clone() {
        Some(guid) => TagSendOutcome::FailedExisting { guid },
        None => TagSendOutcome::FailedNew,
    }
}

/// Marks every item of a scope as failed, e.g. when no note store could
/// be resolved for it
fn fail_whole_scope(state: &ScopeState, items: ScopeItems, error: &anyhow::Error) {
    let shared = Arc::new(anyhow::anyhow!("{error:#}"));

    let mut status = state.status.lock().unwrap();
    for search in items.searches {
        status.total_attempted_to_send_saved_searches += 1;
        status.failed_to_send_saved_searches.push(SavedSearchWithError {
            search,
            error: Arc::clone(&shared),
        });
    }
    for tag in items.tags {
        status.total_attempted_to_send_tags += 1;
        status.failed_to_send_tags.push(TagWithError {
            tag,
            error: Arc::clone(&shared),
        });
    }
    for notebook in items.notebooks {
        status.total_attempted_to_send_notebooks += 1;
        status.failed_to_send_notebooks.push(NotebookWithError {
            notebook,
            error: Arc::clone(&shared),
        });
    }
    for note in items.notes {
        status.total_attempted_to_send_notes += 1;
        status.failed_to_send_notes.push(NoteWithError {
            note,
            error: Arc::clone(&shared),
        });
    }
    drop(status);

    state.push_snapshot();
}

fn record_failed_search(state: &ScopeState, search: SavedSearch, error: anyhow::Error) {
    state
        .status
        .lock()
        .unwrap()
        .failed_to_send_saved_searches
        .push(SavedSearchWithError {
            search,
            error: Arc::new(error),
        });
}

fn record_failed_tag(state: &ScopeState, tag: Tag, error: anyhow::Error) {
    state
        .status
        .lock()
        .unwrap()
        .failed_to_send_tags
        .push(TagWithError {
            tag,
            error: Arc::new(error),
        });
}

fn record_failed_notebook(state: &ScopeState, notebook: Notebook, error: anyhow::Error) {
    state
        .status
        .lock()
        .unwrap()
        .failed_to_send_notebooks
        .push(NotebookWithError {
            notebook,
            error: Arc::new(error),
        });
}

fn record_failed_note(state: &ScopeState, note: Note, error: anyhow::Error) {
    state
        .status
        .lock()
        .unwrap()
        .failed_to_send_notes
        .push(NoteWithError {
            note,
            error: Arc::new(error),
        });
}
