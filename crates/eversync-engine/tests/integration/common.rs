//! Shared test doubles: in-memory local store, fake note store, fake
//! sync state storage and auxiliary downloaders

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use eversync_core::domain::{
    Guid, LinkedNotebook, LocalId, Note, Notebook, Resource, SavedSearch, SyncChunk,
    SyncChunkFilter, SyncState, Tag, Usn,
};
use eversync_core::errors::RemoteError;
use eversync_core::ports::{
    FetchNoteOptions, IInkNoteImageDownloader, IInkNoteImageDownloaderFactory, ILocalStore,
    INoteStore, INoteStoreProvider, INoteThumbnailDownloader, INoteThumbnailDownloaderFactory,
    ISyncStateStorage, ListFilter,
};

// ============================================================================
// In-memory local store
// ============================================================================

#[derive(Default)]
pub struct StoreInner {
    pub notebooks: HashMap<LocalId, Notebook>,
    pub notes: HashMap<LocalId, Note>,
    pub resources: HashMap<LocalId, Resource>,
    pub tags: HashMap<LocalId, Tag>,
    pub saved_searches: HashMap<LocalId, SavedSearch>,
    pub linked_notebooks: HashMap<Guid, LinkedNotebook>,
}

/// `ILocalStore` backed by hash maps, safe for concurrent callers
#[derive(Default)]
pub struct InMemoryLocalStore {
    pub inner: Mutex<StoreInner>,
}

impl InMemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_notebook(&self, notebook: Notebook) {
        self.inner
            .lock()
            .unwrap()
            .notebooks
            .insert(notebook.local_id.clone(), notebook);
    }

    pub fn insert_note(&self, note: Note) {
        self.inner
            .lock()
            .unwrap()
            .notes
            .insert(note.local_id.clone(), note);
    }

    pub fn insert_resource(&self, resource: Resource) {
        self.inner
            .lock()
            .unwrap()
            .resources
            .insert(resource.local_id.clone(), resource);
    }

    pub fn insert_tag(&self, tag: Tag) {
        self.inner
            .lock()
            .unwrap()
            .tags
            .insert(tag.local_id.clone(), tag);
    }

    pub fn insert_saved_search(&self, search: SavedSearch) {
        self.inner
            .lock()
            .unwrap()
            .saved_searches
            .insert(search.local_id.clone(), search);
    }

    pub fn note_by_guid(&self, guid: &Guid) -> Option<Note> {
        self.inner
            .lock()
            .unwrap()
            .notes
            .values()
            .find(|n| n.guid.as_ref() == Some(guid))
            .cloned()
    }

    pub fn notebook_by_guid(&self, guid: &Guid) -> Option<Notebook> {
        self.inner
            .lock()
            .unwrap()
            .notebooks
            .values()
            .find(|n| n.guid.as_ref() == Some(guid))
            .cloned()
    }

    pub fn tag_by_local_id(&self, local_id: &LocalId) -> Option<Tag> {
        self.inner.lock().unwrap().tags.get(local_id).cloned()
    }

    pub fn note_by_local_id(&self, local_id: &LocalId) -> Option<Note> {
        self.inner.lock().unwrap().notes.get(local_id).cloned()
    }

    pub fn note_count(&self) -> usize {
        self.inner.lock().unwrap().notes.len()
    }
}

#[async_trait::async_trait]
impl ILocalStore for InMemoryLocalStore {
    async fn find_notebook_by_guid(&self, guid: &Guid) -> anyhow::Result<Option<Notebook>> {
        Ok(self.notebook_by_guid(guid))
    }

    async fn find_notebook_by_name(
        &self,
        name: &str,
        linked_notebook_guid: Option<&Guid>,
    ) -> anyhow::Result<Option<Notebook>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .notebooks
            .values()
            .find(|n| {
                n.name.as_deref() == Some(name)
                    && n.linked_notebook_guid.as_ref() == linked_notebook_guid
            })
            .cloned())
    }

    async fn put_notebook(&self, notebook: Notebook) -> anyhow::Result<()> {
        self.insert_notebook(notebook);
        Ok(())
    }

    async fn expunge_notebook_by_guid(&self, guid: &Guid) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .notebooks
            .retain(|_, n| n.guid.as_ref() != Some(guid));
        Ok(())
    }

    async fn list_notebooks(&self, filter: ListFilter) -> anyhow::Result<Vec<Notebook>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .notebooks
            .values()
            .filter(|n| !filter.locally_modified_only || n.locally_modified)
            .cloned()
            .collect())
    }

    async fn find_note_by_guid(
        &self,
        guid: &Guid,
        _options: FetchNoteOptions,
    ) -> anyhow::Result<Option<Note>> {
        Ok(self.note_by_guid(guid))
    }

    async fn put_note(&self, note: Note) -> anyhow::Result<()> {
        self.insert_note(note);
        Ok(())
    }

    async fn expunge_note_by_guid(&self, guid: &Guid) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .notes
            .retain(|_, n| n.guid.as_ref() != Some(guid));
        Ok(())
    }

    async fn list_notes(&self, filter: ListFilter) -> anyhow::Result<Vec<Note>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .notes
            .values()
            .filter(|n| !filter.locally_modified_only || n.locally_modified)
            .cloned()
            .collect())
    }

    async fn find_resource_by_guid(
        &self,
        guid: &Guid,
        _with_binary_data: bool,
    ) -> anyhow::Result<Option<Resource>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .resources
            .values()
            .find(|r| r.guid.as_ref() == Some(guid))
            .cloned())
    }

    async fn put_resource(&self, resource: Resource) -> anyhow::Result<()> {
        self.insert_resource(resource);
        Ok(())
    }

    async fn find_tag_by_guid(&self, guid: &Guid) -> anyhow::Result<Option<Tag>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .tags
            .values()
            .find(|t| t.guid.as_ref() == Some(guid))
            .cloned())
    }

    async fn find_tag_by_name(
        &self,
        name: &str,
        linked_notebook_guid: Option<&Guid>,
    ) -> anyhow::Result<Option<Tag>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .tags
            .values()
            .find(|t| {
                t.name.as_deref() == Some(name)
                    && t.linked_notebook_guid.as_ref() == linked_notebook_guid
            })
            .cloned())
    }

    async fn put_tag(&self, tag: Tag) -> anyhow::Result<()> {
        self.insert_tag(tag);
        Ok(())
    }

    async fn expunge_tag_by_guid(&self, guid: &Guid) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .tags
            .retain(|_, t| t.guid.as_ref() != Some(guid));
        Ok(())
    }

    async fn list_tags(&self, filter: ListFilter) -> anyhow::Result<Vec<Tag>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .tags
            .values()
            .filter(|t| !filter.locally_modified_only || t.locally_modified)
            .cloned()
            .collect())
    }

    async fn find_saved_search_by_guid(&self, guid: &Guid) -> anyhow::Result<Option<SavedSearch>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .saved_searches
            .values()
            .find(|s| s.guid.as_ref() == Some(guid))
            .cloned())
    }

    async fn find_saved_search_by_name(&self, name: &str) -> anyhow::Result<Option<SavedSearch>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .saved_searches
            .values()
            .find(|s| s.name.as_deref() == Some(name))
            .cloned())
    }

    async fn put_saved_search(&self, search: SavedSearch) -> anyhow::Result<()> {
        self.insert_saved_search(search);
        Ok(())
    }

    async fn expunge_saved_search_by_guid(&self, guid: &Guid) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .saved_searches
            .retain(|_, s| s.guid.as_ref() != Some(guid));
        Ok(())
    }

    async fn list_saved_searches(&self, filter: ListFilter) -> anyhow::Result<Vec<SavedSearch>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .saved_searches
            .values()
            .filter(|s| !filter.locally_modified_only || s.locally_modified)
            .cloned()
            .collect())
    }

    async fn find_linked_notebook_by_guid(
        &self,
        guid: &Guid,
    ) -> anyhow::Result<Option<LinkedNotebook>> {
        Ok(self.inner.lock().unwrap().linked_notebooks.get(guid).cloned())
    }

    async fn put_linked_notebook(&self, linked_notebook: LinkedNotebook) -> anyhow::Result<()> {
        let guid = linked_notebook
            .guid
            .clone()
            .ok_or_else(|| anyhow::anyhow!("linked notebook without guid"))?;
        self.inner
            .lock()
            .unwrap()
            .linked_notebooks
            .insert(guid, linked_notebook);
        Ok(())
    }

    async fn expunge_linked_notebook_by_guid(&self, guid: &Guid) -> anyhow::Result<()> {
        self.inner.lock().unwrap().linked_notebooks.remove(guid);
        Ok(())
    }

    async fn list_linked_notebooks(&self) -> anyhow::Result<Vec<LinkedNotebook>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .linked_notebooks
            .values()
            .cloned()
            .collect())
    }

    async fn find_notebook_by_note_local_id(
        &self,
        note_local_id: &LocalId,
    ) -> anyhow::Result<Option<Notebook>> {
        let inner = self.inner.lock().unwrap();
        let Some(note) = inner.notes.get(note_local_id) else {
            return Ok(None);
        };

        if let Some(notebook_local_id) = note.notebook_local_id.as_ref() {
            if let Some(notebook) = inner.notebooks.get(notebook_local_id) {
                return Ok(Some(notebook.clone()));
            }
        }

        if let Some(notebook_guid) = note.notebook_guid.as_ref() {
            return Ok(inner
                .notebooks
                .values()
                .find(|n| n.guid.as_ref() == Some(notebook_guid))
                .cloned());
        }

        Ok(None)
    }
}

// ============================================================================
// Fake note store
// ============================================================================

#[derive(Default)]
pub struct FakeNoteStoreState {
    /// Full note bodies served by `get_note_with_full_data`
    pub full_notes: HashMap<Guid, Note>,
    /// Full resource bodies served by `get_resource_with_full_data`
    pub full_resources: HashMap<Guid, Resource>,
    /// Guids whose full-data download fails with a rate limit error
    pub rate_limited_downloads: bool,
    /// Next USN handed out by create/update calls
    pub next_usn: Usn,
    /// USNs to hand out before falling back to `next_usn` (gap injection)
    pub usn_overrides: VecDeque<Usn>,
    /// create_note starts failing with RATE_LIMIT_REACHED after this many
    /// successful calls
    pub rate_limit_note_creates_after: Option<usize>,
    /// Names for which create_tag fails with a generic error
    pub failing_tag_names: Vec<String>,
    /// Names of created entities, in call order
    pub created_tag_names: Vec<String>,
    pub created_note_titles: Vec<String>,
    /// Canned sync chunks returned by get_filtered_sync_chunk
    pub sync_chunks: Vec<SyncChunk>,
}

pub struct FakeNoteStore {
    pub state: Mutex<FakeNoteStoreState>,
    note_creates: AtomicUsize,
    created_counter: AtomicUsize,
}

impl FakeNoteStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeNoteStoreState {
                next_usn: 1,
                ..Default::default()
            }),
            note_creates: AtomicUsize::new(0),
            created_counter: AtomicUsize::new(0),
        }
    }

    pub fn add_full_note(&self, note: Note) {
        let guid = note.guid.clone().expect("full note needs a guid");
        self.state.lock().unwrap().full_notes.insert(guid, note);
    }

    pub fn add_full_resource(&self, resource: Resource) {
        let guid = resource.guid.clone().expect("full resource needs a guid");
        self.state
            .lock()
            .unwrap()
            .full_resources
            .insert(guid, resource);
    }

    fn next_usn(&self) -> Usn {
        let mut state = self.state.lock().unwrap();
        if let Some(usn) = state.usn_overrides.pop_front() {
            return usn;
        }
        let usn = state.next_usn;
        state.next_usn += 1;
        usn
    }

    fn fresh_guid(&self, prefix: &str) -> Guid {
        let n = self.created_counter.fetch_add(1, Ordering::SeqCst);
        Guid::new(format!("{prefix}-{n}"))
    }
}

#[async_trait::async_trait]
impl INoteStore for FakeNoteStore {
    fn linked_notebook_guid(&self) -> Option<&Guid> {
        None
    }

    async fn get_filtered_sync_chunk(
        &self,
        after_usn: Usn,
        _max_entries: i32,
        _filter: &SyncChunkFilter,
    ) -> anyhow::Result<SyncChunk> {
        let state = self.state.lock().unwrap();
        state
            .sync_chunks
            .iter()
            .find(|chunk| chunk.chunk_high_usn.map_or(false, |high| high > after_usn))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no canned sync chunk beyond USN {after_usn}"))
    }

    async fn get_linked_notebook_sync_chunk(
        &self,
        _linked_notebook: &LinkedNotebook,
        after_usn: Usn,
        max_entries: i32,
        _full_sync_only: bool,
    ) -> anyhow::Result<SyncChunk> {
        let filter = SyncChunkFilter::default();
        self.get_filtered_sync_chunk(after_usn, max_entries, &filter)
            .await
    }

    async fn get_note_with_full_data(&self, guid: &Guid) -> anyhow::Result<Note> {
        let state = self.state.lock().unwrap();
        if state.rate_limited_downloads {
            return Err(RemoteError::RateLimitReached {
                duration_seconds: Some(300),
            }
            .into());
        }
        state
            .full_notes
            .get(guid)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no full note data for guid {guid}"))
    }

    async fn get_resource_with_full_data(&self, guid: &Guid) -> anyhow::Result<Resource> {
        let state = self.state.lock().unwrap();
        if state.rate_limited_downloads {
            return Err(RemoteError::RateLimitReached {
                duration_seconds: Some(300),
            }
            .into());
        }
        state
            .full_resources
            .get(guid)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no full resource data for guid {guid}"))
    }

    async fn create_notebook(&self, mut notebook: Notebook) -> anyhow::Result<Notebook> {
        notebook.guid = Some(self.fresh_guid("srv-nb"));
        notebook.update_sequence_num = Some(self.next_usn());
        Ok(notebook)
    }

    async fn update_notebook(&self, _notebook: Notebook) -> anyhow::Result<Usn> {
        Ok(self.next_usn())
    }

    async fn create_note(&self, mut note: Note) -> anyhow::Result<Note> {
        {
            let state = self.state.lock().unwrap();
            if let Some(limit) = state.rate_limit_note_creates_after {
                if self.note_creates.load(Ordering::SeqCst) >= limit {
                    return Err(RemoteError::RateLimitReached {
                        duration_seconds: Some(300),
                    }
                    .into());
                }
            }
        }
        self.note_creates.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .created_note_titles
            .push(note.title.clone().unwrap_or_default());

        note.guid = Some(self.fresh_guid("srv-note"));
        note.update_sequence_num = Some(self.next_usn());
        Ok(note)
    }

    async fn update_note(&self, mut note: Note) -> anyhow::Result<Note> {
        note.update_sequence_num = Some(self.next_usn());
        Ok(note)
    }

    async fn create_tag(&self, mut tag: Tag) -> anyhow::Result<Tag> {
        let name = tag.name.clone().unwrap_or_default();
        {
            let state = self.state.lock().unwrap();
            if state.failing_tag_names.contains(&name) {
                return Err(anyhow::anyhow!("create_tag failed for \"{name}\""));
            }
        }
        self.state.lock().unwrap().created_tag_names.push(name);

        tag.guid = Some(self.fresh_guid("srv-tag"));
        tag.update_sequence_num = Some(self.next_usn());
        Ok(tag)
    }

    async fn update_tag(&self, tag: Tag) -> anyhow::Result<Usn> {
        let name = tag.name.clone().unwrap_or_default();
        let state = self.state.lock().unwrap();
        if state.failing_tag_names.contains(&name) {
            return Err(anyhow::anyhow!("update_tag failed for \"{name}\""));
        }
        drop(state);
        Ok(self.next_usn())
    }

    async fn create_saved_search(&self, mut search: SavedSearch) -> anyhow::Result<SavedSearch> {
        search.guid = Some(self.fresh_guid("srv-search"));
        search.update_sequence_num = Some(self.next_usn());
        Ok(search)
    }

    async fn update_saved_search(&self, _search: SavedSearch) -> anyhow::Result<Usn> {
        Ok(self.next_usn())
    }
}

/// Provider handing out one shared fake note store for every scope
pub struct FakeNoteStoreProvider {
    pub note_store: Arc<FakeNoteStore>,
}

#[async_trait::async_trait]
impl INoteStoreProvider for FakeNoteStoreProvider {
    async fn user_own_note_store(&self) -> anyhow::Result<Arc<dyn INoteStore>> {
        Ok(Arc::clone(&self.note_store) as Arc<dyn INoteStore>)
    }

    async fn linked_notebook_note_store(
        &self,
        _linked_notebook_guid: &Guid,
    ) -> anyhow::Result<Arc<dyn INoteStore>> {
        Ok(Arc::clone(&self.note_store) as Arc<dyn INoteStore>)
    }

    async fn note_store_for_notebook_guid(
        &self,
        _notebook_guid: &Guid,
    ) -> anyhow::Result<Arc<dyn INoteStore>> {
        Ok(Arc::clone(&self.note_store) as Arc<dyn INoteStore>)
    }

    async fn note_store_for_note_local_id(
        &self,
        _note_local_id: &LocalId,
    ) -> anyhow::Result<Arc<dyn INoteStore>> {
        Ok(Arc::clone(&self.note_store) as Arc<dyn INoteStore>)
    }
}

// ============================================================================
// Fake auxiliary downloaders
// ============================================================================

pub struct FakeThumbnailDownloader {
    pub bytes: Vec<u8>,
    pub fail: bool,
}

#[async_trait::async_trait]
impl INoteThumbnailDownloader for FakeThumbnailDownloader {
    async fn download_thumbnail(&self, _note_guid: &Guid, _size: u32) -> anyhow::Result<Vec<u8>> {
        if self.fail {
            anyhow::bail!("thumbnail download failed");
        }
        Ok(self.bytes.clone())
    }
}

pub struct FakeThumbnailDownloaderFactory {
    pub bytes: Vec<u8>,
    pub fail: bool,
}

#[async_trait::async_trait]
impl INoteThumbnailDownloaderFactory for FakeThumbnailDownloaderFactory {
    async fn create_note_thumbnail_downloader(
        &self,
        _notebook_guid: &Guid,
    ) -> anyhow::Result<Arc<dyn INoteThumbnailDownloader>> {
        Ok(Arc::new(FakeThumbnailDownloader {
            bytes: self.bytes.clone(),
            fail: self.fail,
        }))
    }
}

pub struct FakeInkNoteImageDownloader {
    pub bytes: Vec<u8>,
}

#[async_trait::async_trait]
impl IInkNoteImageDownloader for FakeInkNoteImageDownloader {
    async fn download_ink_note_image(
        &self,
        _resource_guid: &Guid,
        _width: i16,
        _height: i16,
    ) -> anyhow::Result<Vec<u8>> {
        Ok(self.bytes.clone())
    }
}

pub struct FakeInkNoteImageDownloaderFactory {
    pub bytes: Vec<u8>,
}

#[async_trait::async_trait]
impl IInkNoteImageDownloaderFactory for FakeInkNoteImageDownloaderFactory {
    async fn create_ink_note_image_downloader(
        &self,
        _notebook_guid: &Guid,
    ) -> anyhow::Result<Arc<dyn IInkNoteImageDownloader>> {
        Ok(Arc::new(FakeInkNoteImageDownloader {
            bytes: self.bytes.clone(),
        }))
    }
}

// ============================================================================
// Fake sync state storage
// ============================================================================

#[derive(Default)]
pub struct FakeSyncStateStorage {
    pub state: Mutex<SyncState>,
}

#[async_trait::async_trait]
impl ISyncStateStorage for FakeSyncStateStorage {
    async fn get_sync_state(&self) -> anyhow::Result<SyncState> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn set_sync_state(&self, state: SyncState) -> anyhow::Result<()> {
        *self.state.lock().unwrap() = state;
        Ok(())
    }
}

// ============================================================================
// Entity builders
// ============================================================================

pub fn chunk_note(guid: &str, usn: Usn, notebook_guid: &str) -> Note {
    let mut note = Note::new();
    note.guid = Some(Guid::new(guid));
    note.update_sequence_num = Some(usn);
    note.notebook_guid = Some(Guid::new(notebook_guid));
    note.title = Some(format!("note {guid}"));
    note
}

pub fn full_note_for(chunk_note: &Note, content: &str) -> Note {
    let mut note = chunk_note.clone();
    // The server assigns its own local id; processors must undo this
    note.local_id = LocalId::generate();
    note.content = Some(content.to_string());
    note
}
