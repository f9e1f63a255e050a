//! # inkdraft-blob: local-first storage for editor drafts
//!
//! `inkdraft-blob` keeps staged images and draft snapshots on the author's
//! side of the wire, so unsaved work survives a reload and nothing touches
//! the network until the document is saved.
//!
//! ## Key namespaces
//!
//! ```text
//! images:<id>                 one CachedImage per staged file
//! draft:current               the active new-document snapshot
//! draft:<documentId|new>      per-document snapshots (legacy layout)
//! ```
//!
//! Every value is wrapped in a [`StoredRecord`] envelope carrying
//! [`RECORD_SCHEMA_VERSION`]. Records from another version read back as
//! absent instead of failing to parse.
//!
//! ## Quick Start
//!
//! ```rust
//! use inkdraft_blob::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> BlobResult<()> {
//! let store = MemoryLocalStore::new();
//!
//! let blob = EncodedImage::new(vec![0xff, 0xd8, 0xff], "image/jpeg");
//! let id = ImageId::generate(ImageRole::Content);
//! let record = ImageRecord::new(id.clone(), blob, "cat.jpg", 3);
//! let image = CachedImage::new(ImageRole::Content, record);
//! store.put_image(image).await?;
//!
//! let cached = store.get_image(&id).await?.expect("just stored");
//! assert_eq!(cached.record().inline_reference.decode()?.bytes.len(), 3);
//!
//! store.clear_namespace(IMAGES_NAMESPACE).await?;
//! assert!(store.get_all_images().await?.is_empty());
//! # Ok(())
//! # }
//! ```

mod error;
pub mod fs_store;
pub mod inline;
mod keys;
pub mod memory;
pub mod store;
mod types;

pub use error::{BlobError, BlobResult};
pub use fs_store::FsLocalStore;
pub use inline::{
    find_local_references, parse_placeholder, placeholder, InlineReference, PLACEHOLDER_SCHEME,
};
pub use keys::{StoreKey, DRAFTS_NAMESPACE, IMAGES_NAMESPACE};
pub use memory::MemoryLocalStore;
pub use store::{LocalStore, LocalStoreExt, StoreCapabilities};
pub use types::{
    now_millis, CachedImage, CoverState, DraftSnapshot, EncodedImage, ImageId, ImageRecord,
    ImageRole, RecordBody, RemoteDescriptor, StoredRecord, RECORD_SCHEMA_VERSION,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BlobError, BlobResult, CachedImage, DraftSnapshot, EncodedImage, FsLocalStore, ImageId,
        ImageRecord, ImageRole, InlineReference, LocalStore, LocalStoreExt, MemoryLocalStore,
        StoreKey, StoredRecord, DRAFTS_NAMESPACE, IMAGES_NAMESPACE,
    };
}
