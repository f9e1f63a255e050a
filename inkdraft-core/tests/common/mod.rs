//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use inkdraft_core::prelude::*;
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Uploader that records every batch
///
/// URLs come from the per-role script when one is queued, otherwise
/// `https://cdn.test/<id>`.
#[derive(Default)]
pub struct RecordingUploader {
    batches: Mutex<Vec<Vec<UploadFile>>>,
    cover_urls: Mutex<VecDeque<String>>,
    content_urls: Mutex<VecDeque<String>>,
    pub fail_cover: AtomicBool,
    pub fail_content: AtomicBool,
}

impl RecordingUploader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(cover: &[&str], content: &[&str]) -> Arc<Self> {
        let uploader = Self::default();
        uploader.cover_urls.lock().extend(cover.iter().map(|u| u.to_string()));
        uploader.content_urls.lock().extend(content.iter().map(|u| u.to_string()));
        Arc::new(uploader)
    }

    pub fn batches(&self) -> Vec<Vec<UploadFile>> {
        self.batches.lock().clone()
    }

    pub fn uploaded_files(&self) -> usize {
        self.batches.lock().iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl RemoteUploader for RecordingUploader {
    async fn upload_batch(
        &self,
        files: Vec<UploadFile>,
    ) -> Result<Vec<RemoteDescriptor>, UploadError> {
        let is_cover = files.iter().all(|f| f.id.as_str().starts_with("cover_"));
        let failing = if is_cover { &self.fail_cover } else { &self.fail_content };
        if failing.load(Ordering::SeqCst) {
            return Err(UploadError::rejected("upload service unavailable"));
        }

        let script = if is_cover { &self.cover_urls } else { &self.content_urls };
        let descriptors = files
            .iter()
            .map(|file| {
                let url = script
                    .lock()
                    .pop_front()
                    .unwrap_or_else(|| format!("https://cdn.test/{}", file.id));
                RemoteDescriptor::new(url, file.id.to_string())
            })
            .collect();

        self.batches.lock().push(files);
        Ok(descriptors)
    }
}

/// Document store keeping payloads in a map
#[derive(Default)]
pub struct MemoryDocuments {
    docs: Mutex<HashMap<String, DocumentPayload>>,
    creates: AtomicUsize,
    updates: AtomicUsize,
    pub fail: AtomicBool,
    gate: Option<Gate>,
}

/// Holds `create`/`update` until released
#[derive(Default)]
pub struct Gate {
    entered: Notify,
    release: Notify,
}

impl MemoryDocuments {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Gate::default()),
            ..Default::default()
        })
    }

    pub fn with_document(id: &str, payload: DocumentPayload) -> Arc<Self> {
        let documents = Self::default();
        documents.docs.lock().insert(id.to_string(), payload);
        Arc::new(documents)
    }

    /// Wait until a submission is parked at the gate
    pub async fn entered(&self) {
        if let Some(gate) = &self.gate {
            gate.entered.notified().await;
        }
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.release.notify_one();
        }
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn get(&self, id: &DocumentId) -> Option<DocumentPayload> {
        self.docs.lock().get(id.as_str()).cloned()
    }

    async fn pass_gate(&self) -> Result<(), DocumentError> {
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(DocumentError::rejected("database unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocuments {
    async fn create(&self, payload: DocumentPayload) -> Result<DocumentId, DocumentError> {
        self.pass_gate().await?;
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        let id = DocumentId::new(format!("doc-{n}"));
        self.docs.lock().insert(id.to_string(), payload);
        Ok(id)
    }

    async fn update(&self, id: &DocumentId, payload: DocumentPayload) -> Result<(), DocumentError> {
        self.pass_gate().await?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.docs.lock().insert(id.to_string(), payload);
        Ok(())
    }

    async fn fetch(&self, id: &DocumentId) -> Result<DocumentPayload, DocumentError> {
        self.docs
            .lock()
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| DocumentError::not_found(id.as_str()))
    }
}

pub fn deps(
    store: Arc<dyn LocalStore>,
    uploader: Arc<RecordingUploader>,
    documents: Arc<MemoryDocuments>,
) -> SessionDeps {
    SessionDeps::new(store, uploader, documents).with_compressor(Arc::new(NoopCompressor))
}

pub fn png_file(name: &str, payload: &[u8]) -> SourceFile {
    SourceFile::new(name, "image/png", payload.to_vec())
}

pub use inkdraft_core::NoopCompressor;
