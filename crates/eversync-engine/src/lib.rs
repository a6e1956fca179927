//! Eversync Engine - Durable incremental synchronization
//!
//! The engine drives bidirectional sync between a local content store and
//! a remote Evernote-style service:
//!
//! 1. **Download**: [`chunks`] pulls sync chunks (with an on-disk cache so
//!    interrupted syncs resume), [`processors`] applies them to the local
//!    store, resolving conflicts and downloading full note/resource bodies.
//! 2. **Durability**: the durable processor wrappers journal every per-item
//!    outcome on disk so a retried sync skips already-applied items.
//! 3. **Upload**: the [`sender`] pushes locally modified entities in
//!    dependency order and tracks USNs to detect concurrent remote changes.
//!
//! ## Cancellation
//!
//! A caller-supplied root `CancellationToken` is composed with a
//! processor-internal child token. Rate-limit and auth-expiry errors trip
//! the child so every sibling in-flight item aborts promptly; the caller's
//! token keeps working above that.

pub mod chunks;
pub mod processors;
pub mod sender;
pub mod status;
pub mod sync_state;

pub use sender::{ISenderCallback, Sender, SenderOutput};
pub use sync_state::FileSyncStateStorage;
pub use status::{
    DownloadNotesStatus, DownloadResourcesStatus, GuidWithError, NoteWithError,
    ProcessNoteStatus, ProcessResourceStatus, ResourceWithError, SendStatus, SyncResult,
};
