//! Notebooks / tags / linked notebooks processor tests
//!
//! These also exercise the default conflict resolver against the
//! in-memory store, since the simple processors delegate every duplicate
//! to it.

use std::sync::{Arc, Mutex};

use eversync_conflict::SimpleConflictResolver;
use eversync_core::domain::{Guid, LinkedNotebook, Notebook, SyncChunk, Tag};
use eversync_core::ports::ILocalStore;
use eversync_engine::processors::{
    INotebooksProcessorCallback, LinkedNotebooksProcessor, NotebooksProcessor, TagsProcessor,
};

use crate::common::InMemoryLocalStore;

fn notebook_in_chunk(guid: &str, usn: i32, name: &str) -> Notebook {
    let mut notebook = Notebook::new(name);
    notebook.guid = Some(Guid::new(guid));
    notebook.update_sequence_num = Some(usn);
    notebook.locally_modified = false;
    notebook
}

fn tag_in_chunk(guid: &str, usn: i32, name: &str) -> Tag {
    let mut tag = Tag::new(name);
    tag.guid = Some(Guid::new(guid));
    tag.update_sequence_num = Some(usn);
    tag.locally_modified = false;
    tag
}

fn notebooks_processor(local_store: &Arc<InMemoryLocalStore>) -> NotebooksProcessor {
    NotebooksProcessor::new(
        Arc::clone(local_store) as Arc<dyn ILocalStore>,
        Arc::new(SimpleConflictResolver::new(
            Arc::clone(local_store) as Arc<dyn ILocalStore>
        )),
    )
}

fn tags_processor(local_store: &Arc<InMemoryLocalStore>) -> TagsProcessor {
    TagsProcessor::new(
        Arc::clone(local_store) as Arc<dyn ILocalStore>,
        Arc::new(SimpleConflictResolver::new(
            Arc::clone(local_store) as Arc<dyn ILocalStore>
        )),
    )
}

#[derive(Default)]
struct RecordingNotebooksCallback {
    snapshots: Mutex<Vec<(u32, u32, u32, u32, u32)>>,
}

impl INotebooksProcessorCallback for RecordingNotebooksCallback {
    fn on_notebooks_processing_progress(
        &self,
        total_notebooks: u32,
        total_notebooks_to_expunge: u32,
        added_notebooks: u32,
        updated_notebooks: u32,
        expunged_notebooks: u32,
    ) {
        self.snapshots.lock().unwrap().push((
            total_notebooks,
            total_notebooks_to_expunge,
            added_notebooks,
            updated_notebooks,
            expunged_notebooks,
        ));
    }
}

#[tokio::test]
async fn new_notebooks_are_added() {
    let local_store = Arc::new(InMemoryLocalStore::new());
    let processor = notebooks_processor(&local_store);

    let mut chunk = SyncChunk::default();
    chunk.notebooks = Some(vec![
        notebook_in_chunk("nb-1", 1, "Work"),
        notebook_in_chunk("nb-2", 2, "Home"),
    ]);

    processor.process_notebooks(&[chunk], None).await.unwrap();

    assert!(local_store.notebook_by_guid(&Guid::new("nb-1")).is_some());
    assert!(local_store.notebook_by_guid(&Guid::new("nb-2")).is_some());
}

#[tokio::test]
async fn updated_notebook_keeps_local_id_and_favorited_flag() {
    let local_store = Arc::new(InMemoryLocalStore::new());
    let processor = notebooks_processor(&local_store);

    let mut local = notebook_in_chunk("nb-1", 1, "Work");
    local.locally_favorited = true;
    let local_id = local.local_id.clone();
    local_store.insert_notebook(local);

    let mut chunk = SyncChunk::default();
    chunk.notebooks = Some(vec![notebook_in_chunk("nb-1", 5, "Work renamed")]);

    processor.process_notebooks(&[chunk], None).await.unwrap();

    let stored = local_store.notebook_by_guid(&Guid::new("nb-1")).unwrap();
    assert_eq!(stored.local_id, local_id);
    assert!(stored.locally_favorited);
    assert_eq!(stored.name.as_deref(), Some("Work renamed"));
}

#[tokio::test]
async fn name_conflict_renames_the_local_notebook() {
    let local_store = Arc::new(InMemoryLocalStore::new());
    let processor = notebooks_processor(&local_store);

    // A local-only notebook shares the incoming notebook's name
    let local_only = Notebook::new("Projects");
    local_store.insert_notebook(local_only.clone());

    let mut chunk = SyncChunk::default();
    chunk.notebooks = Some(vec![notebook_in_chunk("nb-remote", 4, "Projects")]);

    processor.process_notebooks(&[chunk], None).await.unwrap();

    let inner = local_store.inner.lock().unwrap();
    assert_eq!(inner.notebooks.len(), 2);

    let renamed = inner.notebooks.get(&local_only.local_id).unwrap();
    assert_eq!(renamed.name.as_deref(), Some("Projects - conflicting"));
    assert!(renamed.locally_modified);

    let incoming = inner
        .notebooks
        .values()
        .find(|n| n.guid == Some(Guid::new("nb-remote")))
        .unwrap();
    assert_eq!(incoming.name.as_deref(), Some("Projects"));
}

#[tokio::test]
async fn expunge_wins_over_update_and_counters_report_it() {
    let local_store = Arc::new(InMemoryLocalStore::new());
    let processor = notebooks_processor(&local_store);

    local_store.insert_notebook(notebook_in_chunk("nb-gone", 2, "Doomed"));

    let mut chunk = SyncChunk::default();
    chunk.notebooks = Some(vec![
        notebook_in_chunk("nb-gone", 9, "Doomed update"),
        notebook_in_chunk("nb-new", 10, "Fresh"),
    ]);
    chunk.expunged_notebooks = Some(vec![Guid::new("nb-gone")]);

    let callback = Arc::new(RecordingNotebooksCallback::default());
    processor
        .process_notebooks(
            &[chunk],
            Some(Arc::clone(&callback) as Arc<dyn INotebooksProcessorCallback>),
        )
        .await
        .unwrap();

    assert!(local_store.notebook_by_guid(&Guid::new("nb-gone")).is_none());
    assert!(local_store.notebook_by_guid(&Guid::new("nb-new")).is_some());

    let snapshots = callback.snapshots.lock().unwrap();
    let last = snapshots.last().unwrap();
    // (total, total_to_expunge, added, updated, expunged); the update of
    // the expunged guid was filtered out entirely
    assert_eq!(*last, (1, 1, 1, 0, 1));
}

#[tokio::test]
async fn tags_respect_linked_notebook_scope_for_name_lookups() {
    let local_store = Arc::new(InMemoryLocalStore::new());
    let processor = tags_processor(&local_store);

    // A user-own tag shares its name with an incoming linked notebook tag
    let user_own = Tag::new("shared");
    local_store.insert_tag(user_own.clone());

    let mut incoming = tag_in_chunk("t-lnb", 3, "shared");
    incoming.linked_notebook_guid = Some(Guid::new("lnb-1"));

    let mut chunk = SyncChunk::default();
    chunk.tags = Some(vec![incoming]);

    processor.process_tags(&[chunk], None).await.unwrap();

    // Different scope, so no conflict: both tags exist untouched
    let inner = local_store.inner.lock().unwrap();
    assert_eq!(inner.tags.len(), 2);
    let local = inner.tags.get(&user_own.local_id).unwrap();
    assert_eq!(local.name.as_deref(), Some("shared"));
}

#[tokio::test]
async fn expunged_tags_are_removed() {
    let local_store = Arc::new(InMemoryLocalStore::new());
    let processor = tags_processor(&local_store);

    local_store.insert_tag(tag_in_chunk("t-gone", 2, "old"));

    let mut chunk = SyncChunk::default();
    chunk.expunged_tags = Some(vec![Guid::new("t-gone")]);

    processor.process_tags(&[chunk], None).await.unwrap();

    assert!(local_store.inner.lock().unwrap().tags.is_empty());
}

#[tokio::test]
async fn linked_notebooks_are_applied_without_conflict_resolution() {
    let local_store = Arc::new(InMemoryLocalStore::new());
    let processor = LinkedNotebooksProcessor::new(Arc::clone(&local_store) as Arc<dyn ILocalStore>);

    let mut existing = LinkedNotebook::default();
    existing.guid = Some(Guid::new("lnb-1"));
    existing.username = Some("old-name".to_string());
    existing.update_sequence_num = Some(1);
    local_store
        .inner
        .lock()
        .unwrap()
        .linked_notebooks
        .insert(Guid::new("lnb-1"), existing);

    let mut incoming = LinkedNotebook::default();
    incoming.guid = Some(Guid::new("lnb-1"));
    incoming.username = Some("new-name".to_string());
    incoming.update_sequence_num = Some(7);

    let mut expunged_target = LinkedNotebook::default();
    expunged_target.guid = Some(Guid::new("lnb-2"));
    expunged_target.update_sequence_num = Some(3);
    local_store
        .inner
        .lock()
        .unwrap()
        .linked_notebooks
        .insert(Guid::new("lnb-2"), expunged_target);

    let mut chunk = SyncChunk::default();
    chunk.linked_notebooks = Some(vec![incoming]);
    chunk.expunged_linked_notebooks = Some(vec![Guid::new("lnb-2")]);

    processor
        .process_linked_notebooks(&[chunk], None)
        .await
        .unwrap();

    let inner = local_store.inner.lock().unwrap();
    // Incoming always overrides local
    assert_eq!(
        inner.linked_notebooks[&Guid::new("lnb-1")].username.as_deref(),
        Some("new-name")
    );
    assert!(!inner.linked_notebooks.contains_key(&Guid::new("lnb-2")));
}
