//! Sync chunk acquisition: storage, downloader, provider
//!
//! The provider composes the on-disk storage with the downloader: cached
//! chunks are served when they cover the requested USN range contiguously,
//! otherwise the downloader fills in, and every downloader result (full or
//! partial) is written back to storage so an interrupted sync can resume.

pub mod downloader;
pub mod provider;
pub mod storage;
pub mod utils;

pub use downloader::{
    ISyncChunksDownloader, ISyncChunksDownloaderCallback, SyncChunksDownloader, SyncChunksResult,
};
pub use provider::SyncChunksProvider;
pub use storage::SyncChunksStorage;
