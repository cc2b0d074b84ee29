//! Photo store and blob cache collaborator seams
//!
//! The item store is the single owner of canonical photo state; the engine
//! mutates it only through `save_photo`/`update_photo`. The blob cache
//! owns binary payloads.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Photo, PhotoId, SyncStatus};

/// Partial update applied to a stored photo
///
/// Only the sync bookkeeping fields are engine-writable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotoPatch {
    pub sync_status: Option<SyncStatus>,
    pub cloud_url: Option<String>,
    pub last_synced_at: Option<i64>,
    pub updated_at: Option<i64>,
}

impl PhotoPatch {
    /// Patch marking a photo synced with its remote handle
    #[must_use]
    pub fn synced(cloud_url: impl Into<String>, last_synced_at: i64) -> Self {
        Self {
            sync_status: Some(SyncStatus::Synced),
            cloud_url: Some(cloud_url.into()),
            last_synced_at: Some(last_synced_at),
            updated_at: None,
        }
    }
}

/// Local persistent item store collaborator
#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Photos approved for upload by the external curation process
    async fn curated_photos(&self) -> Result<Vec<Photo>>;

    /// Every photo in the library
    async fn all_photos(&self) -> Result<Vec<Photo>>;

    /// Fetch one photo by ID
    async fn photo(&self, id: &PhotoId) -> Result<Option<Photo>>;

    /// Persist a new or fully-replaced photo
    async fn save_photo(&self, photo: &Photo) -> Result<()>;

    /// Apply a partial update to a photo
    async fn update_photo(&self, id: &PhotoId, patch: PhotoPatch) -> Result<()>;

    /// Photos whose derived metadata has not been pushed yet
    async fn photos_needing_metadata_sync(&self) -> Result<Vec<Photo>>;

    /// Photos whose payload/state has not been synced yet
    async fn photos_needing_sync(&self) -> Result<Vec<Photo>>;
}

/// Local blob cache collaborator
#[async_trait]
pub trait BlobCache: Send + Sync {
    /// Store payload bytes under a key, returning the local reference
    async fn store_payload(&self, bytes: &[u8], key: &str) -> Result<String>;

    /// Read payload bytes back by local reference
    async fn load_payload(&self, blob_ref: &str) -> Result<Vec<u8>>;
}
