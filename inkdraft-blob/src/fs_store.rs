//! Filesystem-backed local store.
//!
//! One JSON file per key under a root directory. File names are the URL-safe
//! base64 of the rendered key, so keys containing `:` or `/` stay portable.
//! Writes go to a temporary sibling first and are renamed into place.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::{BlobResult, LocalStore, StoreCapabilities, StoreKey, StoredRecord};

const RECORD_EXTENSION: &str = "json";

/// Local store that persists records as files under `root`
#[derive(Debug, Clone)]
pub struct FsLocalStore {
    root: PathBuf,
}

impl FsLocalStore {
    /// Open (and create if needed) a store rooted at `root`
    pub async fn open<P: Into<PathBuf>>(root: P) -> BlobResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, key: &StoreKey) -> PathBuf {
        let name = URL_SAFE_NO_PAD.encode(key.to_string());
        self.root.join(format!("{}.{}", name, RECORD_EXTENSION))
    }

    fn key_from_path(path: &Path) -> Option<StoreKey> {
        if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let raw = URL_SAFE_NO_PAD.decode(stem).ok()?;
        let raw = String::from_utf8(raw).ok()?;
        StoreKey::parse(&raw).ok()
    }
}

#[async_trait]
impl LocalStore for FsLocalStore {
    async fn put(&self, key: &StoreKey, record: StoredRecord) -> BlobResult<()> {
        let path = self.record_path(key);
        let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
        let body = serde_json::to_vec(&record)?;

        fs::write(&tmp, &body).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await; // Best effort cleanup
            return Err(e.into());
        }

        debug!(key = %key, bytes = body.len(), "Wrote local record");
        Ok(())
    }

    async fn get(&self, key: &StoreKey) -> BlobResult<Option<StoredRecord>> {
        match fs::read(self.record_path(key)).await {
            Ok(body) => Ok(Some(serde_json::from_slice(&body)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &StoreKey) -> BlobResult<()> {
        match fs::remove_file(self.record_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_keys(&self) -> BlobResult<Vec<StoreKey>> {
        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            match Self::key_from_path(&entry.path()) {
                Some(key) => keys.push(key),
                None => {
                    debug!(path = %entry.path().display(), "Ignoring foreign file in store root")
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::basic().with_durability()
    }
}
