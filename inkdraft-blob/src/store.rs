use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::{
    BlobResult, CachedImage, ImageId, RecordBody, StoreKey, StoredRecord, DRAFTS_NAMESPACE,
    IMAGES_NAMESPACE,
};

/// Key/value operations every local store backend implements
///
/// All operations are idempotent. `delete` of an absent key is a no-op and
/// `get` of an absent key yields `Ok(None)`.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Store a record, replacing any previous value
    async fn put(&self, key: &StoreKey, record: StoredRecord) -> BlobResult<()>;

    /// Read a record
    async fn get(&self, key: &StoreKey) -> BlobResult<Option<StoredRecord>>;

    /// Delete a record
    async fn delete(&self, key: &StoreKey) -> BlobResult<()>;

    /// List every key currently present
    async fn list_keys(&self) -> BlobResult<Vec<StoreKey>>;

    /// Get store capabilities
    fn capabilities(&self) -> StoreCapabilities;
}

/// Store capabilities
#[derive(Debug, Clone, Default)]
pub struct StoreCapabilities {
    /// Survives a process restart
    pub durable: bool,
    /// A crash mid-write never leaves a torn value behind
    pub atomic_writes: bool,
}

impl StoreCapabilities {
    pub fn basic() -> Self {
        Self {
            durable: false,
            atomic_writes: true,
        }
    }

    pub fn with_durability(mut self) -> Self {
        self.durable = true;
        self
    }
}

/// Typed helpers derived from the primitive operations
#[async_trait]
pub trait LocalStoreExt: LocalStore {
    /// Persist a staged image under `images:<id>`
    async fn put_image(&self, image: CachedImage) -> BlobResult<()> {
        let key = StoreKey::image(image.id());
        self.put(&key, StoredRecord::image(image)).await
    }

    /// Read a staged image; stale or mistyped records read as absent
    async fn get_image(&self, id: &ImageId) -> BlobResult<Option<CachedImage>> {
        let key = StoreKey::image(id);
        let record = self.get(&key).await?;
        Ok(record
            .and_then(|r| r.into_current(&key.to_string()))
            .and_then(RecordBody::into_image))
    }

    async fn delete_image(&self, id: &ImageId) -> BlobResult<()> {
        self.delete(&StoreKey::image(id)).await
    }

    /// Every staged image, keyed by id
    async fn get_all_images(&self) -> BlobResult<BTreeMap<ImageId, CachedImage>> {
        let mut images = BTreeMap::new();
        for key in self.list_keys().await? {
            let Some(id) = key.image_id() else {
                continue;
            };
            match self.get_image(id).await {
                Ok(Some(image)) => {
                    images.insert(id.clone(), image);
                }
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable cached image"),
            }
        }
        Ok(images)
    }

    /// Delete every key whose rendered form starts with `prefix`
    ///
    /// A failing delete does not stop the sweep; the first error is returned
    /// once every matching key has been attempted.
    async fn clear_namespace(&self, prefix: &str) -> BlobResult<usize> {
        let mut removed = 0;
        let mut first_error = None;

        for key in self.list_keys().await? {
            if !key.to_string().starts_with(prefix) {
                continue;
            }
            match self.delete(&key).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to delete cached entry");
                    first_error.get_or_insert(e);
                }
            }
        }

        debug!(prefix, removed, "Cleared namespace");
        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    /// Clear both the image and the draft namespaces
    async fn clear_all(&self) -> BlobResult<usize> {
        let images = self.clear_namespace(IMAGES_NAMESPACE).await?;
        let drafts = self.clear_namespace(DRAFTS_NAMESPACE).await?;
        Ok(images + drafts)
    }
}

impl<T: LocalStore + ?Sized> LocalStoreExt for T {}
