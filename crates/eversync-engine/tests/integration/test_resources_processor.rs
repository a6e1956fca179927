//! Resources processor integration tests

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use eversync_core::domain::{Data, Guid, Note, Resource, SyncChunk};
use eversync_core::ports::ILocalStore;
use eversync_engine::processors::{IResourcesProcessor, ResourcesProcessor};

use crate::common::{FakeNoteStore, FakeNoteStoreProvider, InMemoryLocalStore};

struct Setup {
    local_store: Arc<InMemoryLocalStore>,
    note_store: Arc<FakeNoteStore>,
    processor: ResourcesProcessor,
}

fn setup() -> Setup {
    let local_store = Arc::new(InMemoryLocalStore::new());
    let note_store = Arc::new(FakeNoteStore::new());
    let processor = ResourcesProcessor::new(
        Arc::clone(&local_store) as Arc<dyn ILocalStore>,
        Arc::new(FakeNoteStoreProvider {
            note_store: Arc::clone(&note_store),
        }),
    );
    Setup {
        local_store,
        note_store,
        processor,
    }
}

fn owning_note(guid: &str) -> Note {
    let mut note = Note::new();
    note.guid = Some(Guid::new(guid));
    note.locally_modified = false;
    note
}

fn chunk_resource(guid: &str, usn: i32, note_guid: &str) -> Resource {
    let mut resource = Resource::new();
    resource.guid = Some(Guid::new(guid));
    resource.update_sequence_num = Some(usn);
    resource.note_guid = Some(Guid::new(note_guid));
    resource
}

fn full_resource_for(chunk_resource: &Resource, body: &[u8]) -> Resource {
    let mut resource = chunk_resource.clone();
    resource.local_id = eversync_core::domain::LocalId::generate();
    resource.data = Some(Data::from_body(body.to_vec()));
    resource.mime = Some("application/octet-stream".to_string());
    resource
}

#[tokio::test]
async fn new_resource_is_downloaded_and_bound_to_its_note() {
    let env = setup();

    let note = owning_note("n-1");
    let note_local_id = note.local_id.clone();
    env.local_store.insert_note(note);

    let resource = chunk_resource("r-1", 4, "n-1");
    env.note_store
        .add_full_resource(full_resource_for(&resource, b"payload"));

    let mut chunk = SyncChunk::default();
    chunk.resources = Some(vec![resource]);

    let status = env
        .processor
        .process_resources(&[chunk], CancellationToken::new(), None)
        .await;

    assert_eq!(status.total_new_resources, 1);
    assert_eq!(
        status.processed_resource_guids_and_usns.get(&Guid::new("r-1")),
        Some(&4)
    );

    let inner = env.local_store.inner.lock().unwrap();
    let stored = inner
        .resources
        .values()
        .find(|r| r.guid == Some(Guid::new("r-1")))
        .unwrap();
    assert_eq!(stored.note_local_id, Some(note_local_id));
    assert_eq!(
        stored.data.as_ref().unwrap().body.as_deref(),
        Some(b"payload".as_slice())
    );
}

#[tokio::test]
async fn clean_update_preserves_local_ids() {
    let env = setup();

    let note = owning_note("n-1");
    env.local_store.insert_note(note.clone());

    let mut local_resource = chunk_resource("r-1", 2, "n-1");
    local_resource.note_local_id = Some(note.local_id.clone());
    local_resource.locally_modified = false;
    let local_resource_id = local_resource.local_id.clone();
    env.local_store.insert_resource(local_resource);

    let updated = chunk_resource("r-1", 6, "n-1");
    env.note_store
        .add_full_resource(full_resource_for(&updated, b"fresh"));

    let mut chunk = SyncChunk::default();
    chunk.resources = Some(vec![updated]);

    let status = env
        .processor
        .process_resources(&[chunk], CancellationToken::new(), None)
        .await;

    assert_eq!(status.total_updated_resources, 1);

    let inner = env.local_store.inner.lock().unwrap();
    let stored = inner.resources.get(&local_resource_id).unwrap();
    assert_eq!(stored.update_sequence_num, Some(6));
    assert_eq!(
        stored.data.as_ref().unwrap().body.as_deref(),
        Some(b"fresh".as_slice())
    );
}

#[tokio::test]
async fn locally_modified_resource_forks_the_owning_note() {
    let env = setup();

    let mut note = owning_note("n-1");
    note.title = Some("Report".to_string());

    let mut local_resource = chunk_resource("r-1", 2, "n-1");
    local_resource.note_local_id = Some(note.local_id.clone());
    local_resource.locally_modified = true;
    note.resources = Some(vec![local_resource.clone()]);

    env.local_store.insert_note(note);
    env.local_store.insert_resource(local_resource);

    let updated = chunk_resource("r-1", 6, "n-1");
    env.note_store
        .add_full_resource(full_resource_for(&updated, b"server side"));

    let mut chunk = SyncChunk::default();
    chunk.resources = Some(vec![updated]);

    let status = env
        .processor
        .process_resources(&[chunk], CancellationToken::new(), None)
        .await;

    assert_eq!(status.total_updated_resources, 1);
    assert!(status
        .processed_resource_guids_and_usns
        .contains_key(&Guid::new("r-1")));

    let inner = env.local_store.inner.lock().unwrap();
    // The original note plus its conflicting duplicate
    assert_eq!(inner.notes.len(), 2);

    let duplicate = inner
        .notes
        .values()
        .find(|n| n.guid.is_none())
        .expect("conflicting duplicate without guid");
    assert!(duplicate
        .title
        .as_ref()
        .unwrap()
        .starts_with("Report - conflicting ("));
    assert_eq!(
        duplicate.attributes.as_ref().unwrap().conflict_source_note_guid,
        Some(Guid::new("n-1"))
    );
    let duplicated_resources = duplicate.resources.as_ref().unwrap();
    assert!(duplicated_resources.iter().all(|r| r.guid.is_none()));
}

#[tokio::test]
async fn resource_whose_note_is_unknown_fails_to_process() {
    let env = setup();

    // No owning note in the local store
    let resource = chunk_resource("r-orphan", 3, "n-missing");

    let mut chunk = SyncChunk::default();
    chunk.resources = Some(vec![resource]);

    let status = env
        .processor
        .process_resources(&[chunk], CancellationToken::new(), None)
        .await;

    assert_eq!(status.resources_which_failed_to_process.len(), 1);
    assert!(status.processed_resource_guids_and_usns.is_empty());
}

#[tokio::test]
async fn chunk_resource_without_note_guid_is_skipped() {
    let env = setup();

    let mut resource = Resource::new();
    resource.guid = Some(Guid::new("r-no-note"));
    resource.update_sequence_num = Some(3);
    // note_guid deliberately absent

    let mut chunk = SyncChunk::default();
    chunk.resources = Some(vec![resource]);

    let status = env
        .processor
        .process_resources(&[chunk], CancellationToken::new(), None)
        .await;

    // Skipped with a warning at collection time, not an error
    assert_eq!(status.total_new_resources, 0);
    assert!(status.resources_which_failed_to_process.is_empty());
    assert!(status.resources_which_failed_to_download.is_empty());
}
