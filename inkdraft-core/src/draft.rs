use std::sync::Arc;

use inkdraft_blob::{
    now_millis, BlobResult, CoverState, DraftSnapshot, LocalStore, LocalStoreExt, RecordBody,
    StoreKey, StoredRecord,
};
use tracing::{debug, info, warn};

/// Draft snapshots in the `draft:` namespace
///
/// `draft:current` holds the snapshot of the document being composed.
/// `draft:<documentId|new>` is the older per-document layout, still read
/// and written for existing documents.
#[derive(Clone)]
pub struct DraftStore {
    store: Arc<dyn LocalStore>,
}

impl DraftStore {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Overwrite `draft:current`, stamping the snapshot with the current time
    pub async fn save(&self, mut snapshot: DraftSnapshot) -> BlobResult<DraftSnapshot> {
        snapshot.saved_at_ms = now_millis();
        self.store
            .put(&StoreKey::CurrentDraft, StoredRecord::draft(snapshot.clone()))
            .await?;
        debug!(title = %snapshot.title, images = snapshot.local_image_ids.len(), "Saved draft");
        Ok(snapshot)
    }

    /// Load the current draft, falling back to the legacy `draft:new` entry
    ///
    /// Image ids no longer present in the store are dropped.
    pub async fn restore(&self) -> BlobResult<Option<DraftSnapshot>> {
        let snapshot = match self.read(&StoreKey::CurrentDraft).await? {
            Some(snapshot) => Some(snapshot),
            None => self.read(&StoreKey::legacy_draft(None)).await?,
        };

        match snapshot {
            Some(snapshot) => {
                let snapshot = self.prune_missing_images(snapshot).await?;
                info!(saved_at_ms = snapshot.saved_at_ms, "Restored draft from cache");
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// Delete `draft:current`
    pub async fn discard(&self) -> BlobResult<()> {
        self.store.delete(&StoreKey::CurrentDraft).await
    }

    /// Overwrite `draft:<documentId>` (`draft:new` for `None`)
    pub async fn save_legacy(
        &self,
        document_id: Option<&str>,
        mut snapshot: DraftSnapshot,
    ) -> BlobResult<DraftSnapshot> {
        snapshot.saved_at_ms = now_millis();
        let key = StoreKey::legacy_draft(document_id);
        self.store
            .put(&key, StoredRecord::legacy_draft(snapshot.clone()))
            .await?;
        debug!(key = %key, "Saved legacy draft");
        Ok(snapshot)
    }

    pub async fn get_legacy(&self, document_id: Option<&str>) -> BlobResult<Option<DraftSnapshot>> {
        self.read(&StoreKey::legacy_draft(document_id)).await
    }

    pub async fn delete_legacy(&self, document_id: Option<&str>) -> BlobResult<()> {
        self.store.delete(&StoreKey::legacy_draft(document_id)).await
    }

    /// Every readable draft, current and legacy
    pub async fn list_drafts(&self) -> BlobResult<Vec<(StoreKey, DraftSnapshot)>> {
        let mut drafts = Vec::new();
        for key in self.store.list_keys().await? {
            if !key.is_draft() {
                continue;
            }
            match self.read(&key).await {
                Ok(Some(snapshot)) => drafts.push((key, snapshot)),
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable draft"),
            }
        }
        Ok(drafts)
    }

    async fn read(&self, key: &StoreKey) -> BlobResult<Option<DraftSnapshot>> {
        let record = self.store.get(key).await?;
        Ok(record
            .and_then(|r| r.into_current(&key.to_string()))
            .and_then(RecordBody::into_draft))
    }

    async fn prune_missing_images(&self, mut snapshot: DraftSnapshot) -> BlobResult<DraftSnapshot> {
        let mut kept = Vec::with_capacity(snapshot.local_image_ids.len());
        for id in snapshot.local_image_ids {
            if self.store.get_image(&id).await?.is_some() {
                kept.push(id);
            } else {
                warn!(id = %id, "Draft references an image missing from the store");
            }
        }
        snapshot.local_image_ids = kept;

        if let Some(cover) = snapshot.cover.staged_id() {
            let present = snapshot.local_image_ids.contains(cover)
                || self.store.get_image(cover).await?.is_some();
            if !present {
                warn!(id = %cover, "Dropping missing staged cover");
                snapshot.cover = CoverState::None;
            }
        }
        Ok(snapshot)
    }
}
