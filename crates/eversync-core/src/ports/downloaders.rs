//! Auxiliary download ports: note thumbnails and ink note images
//!
//! Both downloaders are created through factories keyed by notebook guid
//! because linked notebooks require shard-specific endpoints and auth.

use std::sync::Arc;

use crate::domain::Guid;

/// Downloads note thumbnails (PNG)
#[async_trait::async_trait]
pub trait INoteThumbnailDownloader: Send + Sync {
    /// Fetches a thumbnail of `size` pixels for the given note
    async fn download_thumbnail(&self, note_guid: &Guid, size: u32) -> anyhow::Result<Vec<u8>>;
}

#[async_trait::async_trait]
pub trait INoteThumbnailDownloaderFactory: Send + Sync {
    async fn create_note_thumbnail_downloader(
        &self,
        notebook_guid: &Guid,
    ) -> anyhow::Result<Arc<dyn INoteThumbnailDownloader>>;
}

/// Downloads rasterized images of ink notes
#[async_trait::async_trait]
pub trait IInkNoteImageDownloader: Send + Sync {
    async fn download_ink_note_image(
        &self,
        resource_guid: &Guid,
        width: i16,
        height: i16,
    ) -> anyhow::Result<Vec<u8>>;
}

#[async_trait::async_trait]
pub trait IInkNoteImageDownloaderFactory: Send + Sync {
    async fn create_ink_note_image_downloader(
        &self,
        notebook_guid: &Guid,
    ) -> anyhow::Result<Arc<dyn IInkNoteImageDownloader>>;
}
