//! Sender integration tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use eversync_core::domain::{Guid, Note, Notebook, SavedSearch, Tag};
use eversync_core::errors::StopSynchronizationError;
use eversync_core::ports::{ILocalStore, INoteStoreProvider, ISyncStateStorage};
use eversync_engine::sender::{ISenderCallback, Sender};
use eversync_engine::status::SendStatus;

use crate::common::{FakeNoteStore, FakeNoteStoreProvider, FakeSyncStateStorage, InMemoryLocalStore};

struct Setup {
    local_store: Arc<InMemoryLocalStore>,
    note_store: Arc<FakeNoteStore>,
    sync_state_storage: Arc<FakeSyncStateStorage>,
    sender: Sender,
}

fn setup() -> Setup {
    let local_store = Arc::new(InMemoryLocalStore::new());
    let note_store = Arc::new(FakeNoteStore::new());
    let sync_state_storage = Arc::new(FakeSyncStateStorage::default());

    let sender = Sender::new(
        Arc::clone(&local_store) as Arc<dyn ILocalStore>,
        Arc::clone(&sync_state_storage) as Arc<dyn ISyncStateStorage>,
        Arc::new(FakeNoteStoreProvider {
            note_store: Arc::clone(&note_store),
        }) as Arc<dyn INoteStoreProvider>,
    );

    Setup {
        local_store,
        note_store,
        sync_state_storage,
        sender,
    }
}

/// Asserts every counter of `updated` is >= its value in `previous`
fn check_send_status_update(previous: &SendStatus, updated: &SendStatus) {
    assert!(updated.total_attempted_to_send_notes >= previous.total_attempted_to_send_notes);
    assert!(
        updated.total_attempted_to_send_notebooks >= previous.total_attempted_to_send_notebooks
    );
    assert!(
        updated.total_attempted_to_send_saved_searches
            >= previous.total_attempted_to_send_saved_searches
    );
    assert!(updated.total_attempted_to_send_tags >= previous.total_attempted_to_send_tags);
    assert!(updated.total_successfully_sent_notes >= previous.total_successfully_sent_notes);
    assert!(
        updated.total_successfully_sent_notebooks >= previous.total_successfully_sent_notebooks
    );
    assert!(
        updated.total_successfully_sent_saved_searches
            >= previous.total_successfully_sent_saved_searches
    );
    assert!(updated.total_successfully_sent_tags >= previous.total_successfully_sent_tags);
    assert!(updated.failed_to_send_notes.len() >= previous.failed_to_send_notes.len());
    assert!(updated.failed_to_send_notebooks.len() >= previous.failed_to_send_notebooks.len());
    assert!(
        updated.failed_to_send_saved_searches.len()
            >= previous.failed_to_send_saved_searches.len()
    );
    assert!(updated.failed_to_send_tags.len() >= previous.failed_to_send_tags.len());
    if previous.need_to_repeat_incremental_sync {
        assert!(updated.need_to_repeat_incremental_sync);
    }
}

/// Callback verifying snapshot monotonicity as updates stream in
#[derive(Default)]
struct MonotonicityCheckingCallback {
    user_own: Mutex<Option<Arc<SendStatus>>>,
    linked: Mutex<HashMap<Guid, Arc<SendStatus>>>,
}

impl ISenderCallback for MonotonicityCheckingCallback {
    fn on_user_own_send_status_update(&self, status: Arc<SendStatus>) {
        let mut previous = self.user_own.lock().unwrap();
        if let Some(previous) = previous.as_ref() {
            check_send_status_update(previous, &status);
        }
        *previous = Some(status);
    }

    fn on_linked_notebook_send_status_update(&self, guid: &Guid, status: Arc<SendStatus>) {
        let mut linked = self.linked.lock().unwrap();
        if let Some(previous) = linked.get(guid) {
            check_send_status_update(previous, &status);
        }
        linked.insert(guid.clone(), status);
    }
}

fn new_notebook(local_store: &InMemoryLocalStore, name: &str) -> Notebook {
    let notebook = Notebook::new(name);
    local_store.insert_notebook(notebook.clone());
    notebook
}

fn new_note(local_store: &InMemoryLocalStore, notebook: &Notebook, title: &str) -> Note {
    let mut note = Note::new();
    note.title = Some(title.into());
    note.notebook_local_id = Some(notebook.local_id.clone());
    note.notebook_guid = notebook.guid.clone();
    local_store.insert_note(note.clone());
    note
}

#[tokio::test]
async fn new_entities_get_guids_and_usns_and_are_no_longer_modified() {
    let env = setup();

    let search = SavedSearch::new("todo", "todo:true");
    env.local_store.insert_saved_search(search.clone());
    let notebook = new_notebook(&env.local_store, "Work");
    let note = new_note(&env.local_store, &notebook, "first");

    let output = env
        .sender
        .send(CancellationToken::new(), None)
        .await
        .unwrap();

    let status = output.user_own_status;
    assert_eq!(status.total_successfully_sent_saved_searches, 1);
    assert_eq!(status.total_successfully_sent_notebooks, 1);
    assert_eq!(status.total_successfully_sent_notes, 1);
    assert!(status.failed_to_send_notes.is_empty());
    assert!(!status.need_to_repeat_incremental_sync);

    let stored_note = env.local_store.note_by_local_id(&note.local_id).unwrap();
    assert!(stored_note.guid.is_some());
    assert!(stored_note.update_sequence_num.is_some());
    assert!(!stored_note.locally_modified);
    // The notebook now has a guid too, assigned before the note was sent
    let inner = env.local_store.inner.lock().unwrap();
    let stored_notebook = inner.notebooks.get(&notebook.local_id).unwrap();
    assert!(stored_notebook.guid.is_some());
}

#[tokio::test]
async fn usn_gap_sets_need_to_repeat_incremental_sync() {
    let env = setup();

    // The last known user-own USN is 42
    env.sync_state_storage
        .state
        .lock()
        .unwrap()
        .user_data_update_count = 42;
    // ... but the server hands out 44 for the first sent item
    env.note_store
        .state
        .lock()
        .unwrap()
        .usn_overrides
        .push_back(44);

    let search = SavedSearch::new("recent", "created:day-1");
    env.local_store.insert_saved_search(search);

    let output = env
        .sender
        .send(CancellationToken::new(), None)
        .await
        .unwrap();

    assert!(output.user_own_status.need_to_repeat_incremental_sync);
    assert_eq!(output.sync_state.user_data_update_count, 44);
}

#[tokio::test]
async fn consecutive_usns_do_not_trigger_repeat() {
    let env = setup();

    env.sync_state_storage
        .state
        .lock()
        .unwrap()
        .user_data_update_count = 10;
    {
        let mut state = env.note_store.state.lock().unwrap();
        state.usn_overrides.push_back(11);
        state.usn_overrides.push_back(12);
    }

    env.local_store
        .insert_saved_search(SavedSearch::new("a", "a"));
    new_notebook(&env.local_store, "Work");

    let output = env
        .sender
        .send(CancellationToken::new(), None)
        .await
        .unwrap();

    assert!(!output.user_own_status.need_to_repeat_incremental_sync);
    assert_eq!(output.sync_state.user_data_update_count, 12);
}

#[tokio::test]
async fn failed_new_parent_tag_skips_all_descendants() {
    let env = setup();

    let mut parent = Tag::new("parent");
    parent.locally_modified = true;
    let mut child = Tag::new("child");
    child.parent_tag_local_id = Some(parent.local_id.clone());
    let mut grandchild = Tag::new("grandchild");
    grandchild.parent_tag_local_id = Some(child.local_id.clone());

    env.local_store.insert_tag(parent.clone());
    env.local_store.insert_tag(child);
    env.local_store.insert_tag(grandchild);

    env.note_store
        .state
        .lock()
        .unwrap()
        .failing_tag_names
        .push("parent".to_string());

    let output = env
        .sender
        .send(CancellationToken::new(), None)
        .await
        .unwrap();

    let status = output.user_own_status;
    assert_eq!(status.total_attempted_to_send_tags, 3);
    assert_eq!(status.total_successfully_sent_tags, 0);
    assert_eq!(status.failed_to_send_tags.len(), 3);

    // create_tag was only ever called for the parent
    let created = env.note_store.state.lock().unwrap().created_tag_names.clone();
    assert!(created.is_empty());
}

#[tokio::test]
async fn failed_update_of_remote_parent_does_not_skip_children() {
    let env = setup();

    let mut parent = Tag::new("parent");
    parent.guid = Some(Guid::new("t-parent"));
    parent.locally_modified = true;
    let mut child = Tag::new("child");
    child.parent_tag_local_id = Some(parent.local_id.clone());
    child.parent_guid = Some(Guid::new("t-parent"));

    env.local_store.insert_tag(parent);
    env.local_store.insert_tag(child.clone());

    // The parent is already on the server; only its update fails
    env.note_store
        .state
        .lock()
        .unwrap()
        .failing_tag_names
        .push("parent".to_string());

    let output = env
        .sender
        .send(CancellationToken::new(), None)
        .await
        .unwrap();

    let status = output.user_own_status;
    assert_eq!(status.total_attempted_to_send_tags, 2);
    assert_eq!(status.total_successfully_sent_tags, 1);
    assert_eq!(status.failed_to_send_tags.len(), 1);

    let stored_child = env.local_store.tag_by_local_id(&child.local_id).unwrap();
    assert!(stored_child.guid.is_some());
    assert_eq!(stored_child.parent_guid, Some(Guid::new("t-parent")));
}

#[tokio::test]
async fn rate_limit_short_circuits_the_remaining_notes() {
    let env = setup();

    let mut notebook = new_notebook(&env.local_store, "Work");
    notebook.guid = Some(Guid::new("nb-1"));
    notebook.locally_modified = false;
    env.local_store.insert_notebook(notebook.clone());

    for i in 0..10 {
        new_note(&env.local_store, &notebook, &format!("note {i}"));
    }

    env.note_store
        .state
        .lock()
        .unwrap()
        .rate_limit_note_creates_after = Some(3);

    let output = env
        .sender
        .send(CancellationToken::new(), None)
        .await
        .unwrap();

    let status = output.user_own_status;
    assert_eq!(status.total_attempted_to_send_notes, 10);
    assert_eq!(status.total_successfully_sent_notes, 3);
    assert_eq!(status.failed_to_send_notes.len(), 7);
    assert_eq!(
        status.stop_synchronization_error,
        Some(StopSynchronizationError::RateLimitReached {
            duration_seconds: Some(300)
        })
    );
}

#[tokio::test]
async fn note_with_failed_new_tag_is_sent_without_it_and_stays_modified() {
    let env = setup();

    let mut notebook = new_notebook(&env.local_store, "Work");
    notebook.guid = Some(Guid::new("nb-1"));
    notebook.locally_modified = false;
    env.local_store.insert_notebook(notebook.clone());

    let mut bad_tag = Tag::new("badtag");
    bad_tag.locally_modified = true;
    env.local_store.insert_tag(bad_tag.clone());

    let mut note = Note::new();
    note.title = Some("tagged".into());
    note.notebook_local_id = Some(notebook.local_id.clone());
    note.notebook_guid = notebook.guid.clone();
    note.tag_local_ids = vec![bad_tag.local_id.clone()];
    env.local_store.insert_note(note.clone());

    env.note_store
        .state
        .lock()
        .unwrap()
        .failing_tag_names
        .push("badtag".to_string());

    let output = env
        .sender
        .send(CancellationToken::new(), None)
        .await
        .unwrap();

    let status = output.user_own_status;
    assert_eq!(status.total_successfully_sent_notes, 1);
    assert_eq!(status.failed_to_send_tags.len(), 1);

    // The note went out, but it keeps its local modification mark so the
    // next sync retries the tag binding
    let stored = env.local_store.note_by_local_id(&note.local_id).unwrap();
    assert!(stored.guid.is_some());
    assert!(stored.locally_modified);
    assert_eq!(stored.tag_local_ids, vec![bad_tag.local_id]);
}

#[tokio::test]
async fn note_in_unsynchronized_notebook_fails() {
    let env = setup();

    // Notebook is local-only and is NOT flagged modified, so it will not
    // be sent during this pass
    let mut notebook = Notebook::new("Drafts");
    notebook.locally_modified = false;
    env.local_store.insert_notebook(notebook.clone());

    let mut note = Note::new();
    note.title = Some("stuck".into());
    note.notebook_local_id = Some(notebook.local_id.clone());
    env.local_store.insert_note(note);

    let output = env
        .sender
        .send(CancellationToken::new(), None)
        .await
        .unwrap();

    let status = output.user_own_status;
    assert_eq!(status.total_attempted_to_send_notes, 1);
    assert_eq!(status.failed_to_send_notes.len(), 1);
}

#[tokio::test]
async fn status_snapshots_are_monotonic() {
    let env = setup();

    let notebook = new_notebook(&env.local_store, "Work");
    for i in 0..5 {
        new_note(&env.local_store, &notebook, &format!("note {i}"));
    }
    for i in 0..3 {
        let mut tag = Tag::new(format!("tag {i}"));
        tag.locally_modified = true;
        env.local_store.insert_tag(tag);
    }
    env.local_store
        .insert_saved_search(SavedSearch::new("s", "q"));

    let callback = Arc::new(MonotonicityCheckingCallback::default());
    env.sender
        .send(
            CancellationToken::new(),
            Some(Arc::clone(&callback) as Arc<dyn ISenderCallback>),
        )
        .await
        .unwrap();

    let final_status = callback.user_own.lock().unwrap().clone().unwrap();
    assert_eq!(final_status.total_successfully_sent_notes, 5);
    assert_eq!(final_status.total_successfully_sent_tags, 3);
    assert_eq!(final_status.total_successfully_sent_notebooks, 1);
    assert_eq!(final_status.total_successfully_sent_saved_searches, 1);
}
