//! Port definitions (hexagonal architecture)
//!
//! Ports are the trait interfaces through which the synchronization engine
//! and the ENML converter talk to the outside world: the local content
//! store, the remote note store, auxiliary downloaders, the conflict
//! resolver and the decrypted-text cache. Adapters live outside this
//! workspace (or in test fakes).

pub mod conflict_resolver;
pub mod decrypted_text_cache;
pub mod downloaders;
pub mod html_cleaner;
pub mod local_store;
pub mod note_store;
pub mod sync_state_storage;

pub use conflict_resolver::{ConflictResolution, ISyncConflictResolver};
pub use decrypted_text_cache::{DecryptedTextEntry, IDecryptedTextCache};
pub use downloaders::{
    IInkNoteImageDownloader, IInkNoteImageDownloaderFactory, INoteThumbnailDownloader,
    INoteThumbnailDownloaderFactory,
};
pub use html_cleaner::IHtmlCleaner;
pub use local_store::{FetchNoteOptions, ILocalStore, ListFilter};
pub use note_store::{INoteStore, INoteStoreProvider};
pub use sync_state_storage::ISyncStateStorage;
