//! # inkdraft-core: local-first image staging for rich-text editors
//!
//! Authors drop images into a document long before anything is uploaded.
//! `inkdraft-core` compresses and stages those images in a local store,
//! snapshots the draft on every edit so a reload loses nothing, and on save
//! uploads the staged images, rewrites their references in the body and
//! submits the finished document.
//!
//! ## Pieces
//!
//! - [`ImageCompressor`]: bounded-size JPEG re-encode, falls back to the
//!   original bytes on any failure
//! - [`StagingManager`]: compress, assign an id, persist under `images:<id>`
//! - [`DraftStore`]: `draft:current` snapshots plus the legacy
//!   `draft:<documentId|new>` layout
//! - [`UploadReconciler`]: cover and content batches, paired positionally
//! - [`ContentRewriter`]: single-pass literal replacement of local references
//! - [`EditorSession`]: owns the registry and the save guard
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use inkdraft_core::prelude::*;
//!
//! # async fn run(
//! #     uploader: Arc<dyn RemoteUploader>,
//! #     documents: Arc<dyn DocumentStore>,
//! #     png: Vec<u8>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let config = DraftConfig::from_env();
//! let store = config.open_store().await?;
//! let deps = SessionDeps::new(store, uploader, documents);
//!
//! let SessionStart { session, restored } = EditorSession::start_new(deps, config).await;
//! if restored {
//!     println!("Restored draft from cache");
//! }
//!
//! session.set_title("Hello, world").await?;
//! let report = session.stage_images(vec![SourceFile::new("cat.png", "image/png", png)]).await?;
//! let reference = session.body_reference(&report.staged[0]);
//! session.set_content(format!("<img src=\"{reference}\">")).await?;
//!
//! let outcome = session.save().await?;
//! println!("saved {}", outcome.document_id);
//! # Ok(())
//! # }
//! ```

pub mod compress;
pub mod config;
pub mod document;
pub mod draft;
mod error;
pub mod registry;
pub mod rewrite;
pub mod session;
pub mod staging;
pub mod upload;

pub use compress::{compressor_for, Compressor, ImageCompressor, NoopCompressor};
pub use config::{
    load_env_config, CompressionConfig, ConfigSnapshot, ConfigStore, DraftConfig, ReferenceMode,
    ENV_PREFIX,
};
pub use document::{slugify, DocumentId, DocumentPayload, DocumentStore, DraftDocument};
pub use draft::DraftStore;
pub use error::{
    CompressionError, DocumentError, ReconcileError, SaveError, SavePhase, SessionError,
    SessionResult, StagingFailure, UploadError,
};
pub use registry::ImageRegistry;
pub use rewrite::{ContentRewriter, RewriteReport};
pub use session::{EditorSession, SaveOutcome, SessionDeps, SessionStart, SessionTarget};
pub use staging::{SourceFile, StageReport, StagingManager};
pub use upload::{MappingEntry, RemoteUploader, UploadFile, UploadMapping, UploadReconciler};

/// Install a `tracing` subscriber honoring `RUST_LOG`
///
/// Libraries never do this on their own; applications may call it once.
#[cfg(feature = "tracing-basic")]
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        CompressionConfig, ContentRewriter, DocumentError, DocumentId, DocumentPayload,
        DocumentStore, DraftConfig, DraftStore, EditorSession, ImageCompressor, ReferenceMode,
        RemoteUploader, SaveError, SaveOutcome, SessionDeps, SessionError, SessionStart,
        SourceFile, StagingManager, UploadError, UploadFile, UploadMapping, UploadReconciler,
    };
    pub use inkdraft_blob::prelude::*;
    pub use inkdraft_blob::{CoverState, RemoteDescriptor};
}
