use std::sync::Arc;

use bytes::Bytes;
use inkdraft_blob::{
    BlobResult, CachedImage, EncodedImage, ImageId, ImageRecord, ImageRole, LocalStore,
    LocalStoreExt,
};
use tracing::{debug, info, warn};

use crate::compress::Compressor;
use crate::error::StagingFailure;

/// A raw file handed over by the editor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl SourceFile {
    pub fn new<N, M, B>(name: N, mime_type: M, bytes: B) -> Self
    where
        N: Into<String>,
        M: Into<String>,
        B: Into<Bytes>,
    {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Result of staging a batch of files
#[derive(Debug, Default)]
pub struct StageReport {
    /// Staged images in submission order
    pub staged: Vec<CachedImage>,
    pub failures: Vec<StagingFailure>,
}

impl StageReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Compresses files and persists them under `images:<id>`
#[derive(Clone)]
pub struct StagingManager {
    store: Arc<dyn LocalStore>,
    compressor: Arc<dyn Compressor>,
}

impl StagingManager {
    pub fn new(store: Arc<dyn LocalStore>, compressor: Arc<dyn Compressor>) -> Self {
        Self { store, compressor }
    }

    /// Stage one file
    pub async fn stage(
        &self,
        file: SourceFile,
        role: ImageRole,
    ) -> Result<CachedImage, StagingFailure> {
        if !file.is_image() {
            return Err(StagingFailure::new(
                file.name,
                format!("not an image ({})", file.mime_type),
            ));
        }
        if file.bytes.is_empty() {
            return Err(StagingFailure::new(file.name, "file is empty"));
        }

        let original_size = file.bytes.len() as u64;
        let blob = self
            .compressor
            .compress(EncodedImage::new(file.bytes, file.mime_type))
            .await;

        let id = ImageId::generate(role);
        let image = CachedImage::new(role, ImageRecord::new(id, blob, file.name, original_size));

        self.store
            .put_image(image.clone())
            .await
            .map_err(|e| StagingFailure::new(image.record().original_name.clone(), e.to_string()))?;

        info!(
            id = %image.id(),
            role = %role,
            original_size,
            byte_size = image.record().byte_size,
            "Staged image"
        );
        Ok(image)
    }

    /// Stage files one after another so results keep submission order
    ///
    /// A failing file is reported and skipped; the rest of the batch goes on.
    pub async fn stage_all(&self, files: Vec<SourceFile>, role: ImageRole) -> StageReport {
        let mut report = StageReport::default();
        for file in files {
            match self.stage(file, role).await {
                Ok(image) => report.staged.push(image),
                Err(failure) => {
                    warn!(file = %failure.file_name, reason = %failure.reason, "Skipping file");
                    report.failures.push(failure);
                }
            }
        }
        debug!(
            staged = report.staged.len(),
            failed = report.failures.len(),
            "Staged batch"
        );
        report
    }

    /// Remove one staged image from the store
    pub async fn unstage(&self, id: &ImageId) -> BlobResult<()> {
        self.store.delete_image(id).await?;
        debug!(id = %id, "Unstaged image");
        Ok(())
    }
}
