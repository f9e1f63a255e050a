//! Upload reconciliation.
//!
//! Staged images go to the remote uploader in two batches, the cover alone
//! and every content image together. A batch returns descriptors in
//! submission order, so the i-th descriptor belongs to the i-th file; no
//! content round trip is needed to pair them up.

use std::sync::Arc;

use async_trait::async_trait;
use inkdraft_blob::{CachedImage, EncodedImage, ImageId, ImageRole, RemoteDescriptor};
use tracing::{debug, info};

use crate::config::ReferenceMode;
use crate::error::{ReconcileError, UploadError};

/// One file of an upload batch
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub id: ImageId,
    pub file_name: String,
    pub image: EncodedImage,
}

impl From<&CachedImage> for UploadFile {
    fn from(image: &CachedImage) -> Self {
        let record = image.record();
        Self {
            id: record.id.clone(),
            file_name: record.original_name.clone(),
            image: record.blob.clone(),
        }
    }
}

/// Remote upload collaborator
///
/// On success the returned descriptors match `files` in length and order.
/// A failed batch is rejected as a whole.
#[async_trait]
pub trait RemoteUploader: Send + Sync {
    async fn upload_batch(
        &self,
        files: Vec<UploadFile>,
    ) -> Result<Vec<RemoteDescriptor>, UploadError>;
}

/// A local reference paired with where its image now lives
#[derive(Debug, Clone, PartialEq)]
pub struct MappingEntry {
    pub image_id: ImageId,
    /// The string the body uses for this image
    pub local_reference: String,
    pub remote: RemoteDescriptor,
    pub role: ImageRole,
}

/// Result of one reconciliation; consumed by the rewriter and then dropped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadMapping {
    pub cover: Option<MappingEntry>,
    /// Same order as the content images submitted
    pub content: Vec<MappingEntry>,
}

impl UploadMapping {
    /// Cover first, then content entries in order
    pub fn entries(&self) -> impl Iterator<Item = &MappingEntry> {
        self.cover.iter().chain(self.content.iter())
    }

    pub fn len(&self) -> usize {
        self.content.len() + usize::from(self.cover.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn content_descriptors(&self) -> Vec<RemoteDescriptor> {
        self.content.iter().map(|entry| entry.remote.clone()).collect()
    }
}

/// Uploads staged images and builds the [`UploadMapping`]
#[derive(Clone)]
pub struct UploadReconciler {
    uploader: Arc<dyn RemoteUploader>,
    reference_mode: ReferenceMode,
}

impl UploadReconciler {
    pub fn new(uploader: Arc<dyn RemoteUploader>, reference_mode: ReferenceMode) -> Self {
        Self {
            uploader,
            reference_mode,
        }
    }

    /// Upload the cover and the content images concurrently
    ///
    /// Any failed batch fails the whole reconciliation. Cover images passed
    /// in `content` are skipped.
    pub async fn reconcile(
        &self,
        cover: Option<&CachedImage>,
        content: &[CachedImage],
    ) -> Result<UploadMapping, ReconcileError> {
        let content: Vec<&CachedImage> = content.iter().filter(|image| !image.is_cover()).collect();
        let cover: Vec<&CachedImage> = cover.into_iter().collect();

        debug!(cover = cover.len(), content = content.len(), "Reconciling staged images");

        let (cover_result, content_result) =
            tokio::join!(self.upload(&cover), self.upload(&content));

        let cover = cover_result
            .map_err(|source| ReconcileError::CoverUpload { source })?
            .pop();
        let content = content_result.map_err(|source| ReconcileError::ContentUpload { source })?;

        let mapping = UploadMapping { cover, content };
        info!(uploaded = mapping.len(), "Uploaded staged images");
        Ok(mapping)
    }

    /// Submit one batch and zip it positionally with the descriptors
    async fn upload(&self, images: &[&CachedImage]) -> Result<Vec<MappingEntry>, UploadError> {
        if images.is_empty() {
            return Ok(Vec::new());
        }

        let files = images.iter().map(|image| UploadFile::from(*image)).collect();
        let descriptors = self.uploader.upload_batch(files).await?;
        if descriptors.len() != images.len() {
            return Err(UploadError::CountMismatch {
                submitted: images.len(),
                returned: descriptors.len(),
            });
        }

        Ok(images
            .iter()
            .zip(descriptors)
            .map(|(image, remote)| MappingEntry {
                image_id: image.id().clone(),
                local_reference: self.reference_mode.body_reference(image),
                remote,
                role: image.role(),
            })
            .collect())
    }
}
