//! Notes processor integration tests

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use eversync_conflict::SimpleConflictResolver;
use eversync_core::config::SyncOptions;
use eversync_core::domain::{Guid, SyncChunk};
use eversync_core::errors::StopSynchronizationError;
use eversync_core::ports::ILocalStore;
use eversync_engine::processors::{INotesProcessor, NotesProcessor};

use crate::common::{
    chunk_note, full_note_for, FakeInkNoteImageDownloaderFactory, FakeNoteStore,
    FakeNoteStoreProvider, FakeThumbnailDownloaderFactory, InMemoryLocalStore,
};

struct Setup {
    local_store: Arc<InMemoryLocalStore>,
    note_store: Arc<FakeNoteStore>,
    processor: NotesProcessor,
}

fn setup_with_options(options: SyncOptions) -> Setup {
    let local_store = Arc::new(InMemoryLocalStore::new());
    let note_store = Arc::new(FakeNoteStore::new());

    let processor = NotesProcessor::new(
        Arc::clone(&local_store) as Arc<dyn ILocalStore>,
        Arc::new(SimpleConflictResolver::new(
            Arc::clone(&local_store) as Arc<dyn ILocalStore>
        )),
        Arc::new(FakeNoteStoreProvider {
            note_store: Arc::clone(&note_store),
        }),
        Arc::new(FakeInkNoteImageDownloaderFactory { bytes: vec![1, 2] }),
        Arc::new(FakeThumbnailDownloaderFactory {
            bytes: vec![9, 9, 9],
            fail: false,
        }),
        options,
    );

    Setup {
        local_store,
        note_store,
        processor,
    }
}

fn setup() -> Setup {
    let mut options = SyncOptions::default();
    options.download_note_thumbnails = false;
    options.ink_note_images_storage_dir = None;
    setup_with_options(options)
}

#[tokio::test]
async fn new_notes_are_downloaded_and_stored() {
    let env = setup();

    let note_a = chunk_note("n-a", 1, "nb-1");
    let note_b = chunk_note("n-b", 2, "nb-1");
    env.note_store
        .add_full_note(full_note_for(&note_a, "<en-note>alpha</en-note>"));
    env.note_store
        .add_full_note(full_note_for(&note_b, "<en-note>beta</en-note>"));

    let mut chunk = SyncChunk::default();
    chunk.notes = Some(vec![note_a.clone(), note_b]);

    let status = env
        .processor
        .process_notes(&[chunk], CancellationToken::new(), None)
        .await;

    assert_eq!(status.total_new_notes, 2);
    assert_eq!(status.processed_note_guids_and_usns.len(), 2);
    assert!(status.notes_which_failed_to_download.is_empty());

    let stored = env.local_store.note_by_guid(&Guid::new("n-a")).unwrap();
    assert_eq!(stored.content.as_deref(), Some("<en-note>alpha</en-note>"));
    // The local id of the sync chunk's note entry survives the full-data
    // download, not the server-assigned one
    assert_eq!(stored.local_id, note_a.local_id);
}

#[tokio::test]
async fn unmodified_local_note_is_updated_in_place() {
    let env = setup();

    // The note exists locally, clean, with USN 3
    let mut local = chunk_note("n-a", 3, "nb-1");
    local.locally_modified = false;
    let local_id = local.local_id.clone();
    env.local_store.insert_note(local);

    // The chunk brings USN 7 for the same guid
    let updated = chunk_note("n-a", 7, "nb-1");
    env.note_store
        .add_full_note(full_note_for(&updated, "<en-note>fresh</en-note>"));

    let mut chunk = SyncChunk::default();
    chunk.notes = Some(vec![updated]);

    let status = env
        .processor
        .process_notes(&[chunk], CancellationToken::new(), None)
        .await;

    assert_eq!(status.total_updated_notes, 1);
    let stored = env.local_store.note_by_guid(&Guid::new("n-a")).unwrap();
    assert_eq!(stored.local_id, local_id);
    assert_eq!(stored.content.as_deref(), Some("<en-note>fresh</en-note>"));
    assert_eq!(env.local_store.note_count(), 1);
}

#[tokio::test]
async fn locally_modified_note_forks_a_conflict_copy() {
    let env = setup();

    let mut local = chunk_note("n-a", 3, "nb-1");
    local.title = Some("Plans".into());
    local.locally_modified = true;
    env.local_store.insert_note(local);

    let updated = chunk_note("n-a", 7, "nb-1");
    env.note_store
        .add_full_note(full_note_for(&updated, "<en-note>theirs</en-note>"));

    let mut chunk = SyncChunk::default();
    chunk.notes = Some(vec![updated]);

    env.processor
        .process_notes(&[chunk], CancellationToken::new(), None)
        .await;

    // Two notes now: the incoming canonical one and the local conflict copy
    assert_eq!(env.local_store.note_count(), 2);
    let notes = env.local_store.inner.lock().unwrap().notes.clone();
    let conflict_copy = notes
        .values()
        .find(|n| n.guid.is_none())
        .expect("conflict copy without guid");
    assert!(conflict_copy
        .title
        .as_ref()
        .unwrap()
        .starts_with("Plans - conflicting ("));
    assert_eq!(
        conflict_copy
            .attributes
            .as_ref()
            .unwrap()
            .conflict_source_note_guid,
        Some(Guid::new("n-a"))
    );
}

#[tokio::test]
async fn expunged_notes_are_removed() {
    let env = setup();

    let mut local = chunk_note("n-gone", 3, "nb-1");
    local.locally_modified = false;
    env.local_store.insert_note(local);

    let mut chunk = SyncChunk::default();
    chunk.expunged_notes = Some(vec![Guid::new("n-gone")]);

    let status = env
        .processor
        .process_notes(&[chunk], CancellationToken::new(), None)
        .await;

    assert_eq!(status.total_expunged_notes, 1);
    assert_eq!(status.expunged_note_guids, vec![Guid::new("n-gone")]);
    assert_eq!(env.local_store.note_count(), 0);
}

#[tokio::test]
async fn expunge_wins_over_update_of_the_same_guid() {
    let env = setup();

    let note = chunk_note("n-a", 5, "nb-1");
    let mut chunk = SyncChunk::default();
    chunk.notes = Some(vec![note]);
    chunk.expunged_notes = Some(vec![Guid::new("n-a")]);

    let status = env
        .processor
        .process_notes(&[chunk], CancellationToken::new(), None)
        .await;

    // No download was even attempted for the expunged guid
    assert_eq!(status.total_new_notes, 0);
    assert_eq!(status.total_expunged_notes, 1);
}

#[tokio::test]
async fn rate_limit_stops_the_batch() {
    let env = setup();
    env.note_store.state.lock().unwrap().rate_limited_downloads = true;

    let mut chunk = SyncChunk::default();
    chunk.notes = Some(vec![
        chunk_note("n-1", 1, "nb-1"),
        chunk_note("n-2", 2, "nb-1"),
        chunk_note("n-3", 3, "nb-1"),
    ]);

    let status = env
        .processor
        .process_notes(&[chunk], CancellationToken::new(), None)
        .await;

    assert_eq!(
        status.stop_synchronization_error,
        Some(StopSynchronizationError::RateLimitReached {
            duration_seconds: Some(300)
        })
    );
    // Every note either failed to download or was cancelled after the
    // internal canceler tripped; none was processed
    assert!(status.processed_note_guids_and_usns.is_empty());
    let accounted = status.notes_which_failed_to_download.len()
        + status.cancelled_note_guids_and_usns.len();
    assert_eq!(accounted, 3);
}

#[tokio::test]
async fn thumbnails_are_attached_when_enabled() {
    let mut options = SyncOptions::default();
    options.download_note_thumbnails = true;
    let env = setup_with_options(options);

    let note = chunk_note("n-a", 1, "nb-1");
    let mut full = full_note_for(&note, "<en-note>img</en-note>");
    let mut resource = eversync_core::domain::Resource::new();
    resource.guid = Some(Guid::new("r-1"));
    resource.note_guid = Some(Guid::new("n-a"));
    full.resources = Some(vec![resource]);
    env.note_store.add_full_note(full);

    let mut chunk = SyncChunk::default();
    chunk.notes = Some(vec![note]);

    env.processor
        .process_notes(&[chunk], CancellationToken::new(), None)
        .await;

    let stored = env.local_store.note_by_guid(&Guid::new("n-a")).unwrap();
    assert_eq!(stored.thumbnail_data, Some(vec![9, 9, 9]));
}

#[tokio::test]
async fn thumbnail_failure_is_tolerated() {
    let mut options = SyncOptions::default();
    options.download_note_thumbnails = true;

    let local_store = Arc::new(InMemoryLocalStore::new());
    let note_store = Arc::new(FakeNoteStore::new());
    let processor = NotesProcessor::new(
        Arc::clone(&local_store) as Arc<dyn ILocalStore>,
        Arc::new(SimpleConflictResolver::new(
            Arc::clone(&local_store) as Arc<dyn ILocalStore>
        )),
        Arc::new(FakeNoteStoreProvider {
            note_store: Arc::clone(&note_store),
        }),
        Arc::new(FakeInkNoteImageDownloaderFactory { bytes: vec![] }),
        Arc::new(FakeThumbnailDownloaderFactory {
            bytes: vec![],
            fail: true,
        }),
        options,
    );

    let note = chunk_note("n-a", 1, "nb-1");
    let mut full = full_note_for(&note, "<en-note>img</en-note>");
    let mut resource = eversync_core::domain::Resource::new();
    resource.guid = Some(Guid::new("r-1"));
    resource.note_guid = Some(Guid::new("n-a"));
    full.resources = Some(vec![resource]);
    note_store.add_full_note(full);

    let mut chunk = SyncChunk::default();
    chunk.notes = Some(vec![note]);

    let status = processor
        .process_notes(&[chunk], CancellationToken::new(), None)
        .await;

    // The note was stored anyway, just without a thumbnail
    assert_eq!(status.processed_note_guids_and_usns.len(), 1);
    let stored = local_store.note_by_guid(&Guid::new("n-a")).unwrap();
    assert!(stored.thumbnail_data.is_none());
}
