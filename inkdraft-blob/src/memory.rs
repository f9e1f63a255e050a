use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{BlobResult, LocalStore, StoreCapabilities, StoreKey, StoredRecord};

/// In-memory store for tests and for sessions that do not need to survive a reload
///
/// Keys are normalized on the way in, so two keys that render alike share
/// an entry, as they share a file in [`FsLocalStore`](crate::FsLocalStore).
#[derive(Clone, Default)]
pub struct MemoryLocalStore {
    entries: Arc<RwLock<BTreeMap<StoreKey, StoredRecord>>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn put(&self, key: &StoreKey, record: StoredRecord) -> BlobResult<()> {
        self.entries.write().insert(key.clone().normalized(), record);
        Ok(())
    }

    async fn get(&self, key: &StoreKey) -> BlobResult<Option<StoredRecord>> {
        Ok(self.entries.read().get(&key.clone().normalized()).cloned())
    }

    async fn delete(&self, key: &StoreKey) -> BlobResult<()> {
        self.entries.write().remove(&key.clone().normalized());
        Ok(())
    }

    async fn list_keys(&self) -> BlobResult<Vec<StoreKey>> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::basic()
    }
}
