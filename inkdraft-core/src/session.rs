//! # Editing sessions
//!
//! An [`EditorSession`] owns everything one author's editor needs: the
//! document being composed, the registry of staged images and the guard that
//! keeps two saves from running at once. Sessions never share that state, so
//! two sessions over one store do not corrupt each other's registry.
//!
//! Every content-affecting mutation commits a full draft snapshot before it
//! returns. Saving uploads staged images, rewrites the body, submits the
//! document and only then purges local state.
//!
//! ```text
//! start_new ──► restore draft? ──► mutate* ──► save ──► reconcile ──► rewrite
//!                                                  └──► create/update ──► purge
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use inkdraft_blob::{
    find_local_references, placeholder, BlobResult, CachedImage, CoverState, DraftSnapshot,
    ImageId, ImageRole, LocalStore, LocalStoreExt,
};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::compress::{compressor_for, Compressor};
use crate::config::{DraftConfig, ReferenceMode};
use crate::document::{DocumentId, DocumentPayload, DocumentStore, DraftDocument};
use crate::draft::DraftStore;
use crate::error::{SaveError, SessionError, SessionResult};
use crate::registry::ImageRegistry;
use crate::rewrite::{replace_literals, ContentRewriter};
use crate::staging::{SourceFile, StageReport, StagingManager};
use crate::upload::{RemoteUploader, UploadMapping, UploadReconciler};

/// Collaborators a session works against
#[derive(Clone)]
pub struct SessionDeps {
    pub store: Arc<dyn LocalStore>,
    pub uploader: Arc<dyn RemoteUploader>,
    pub documents: Arc<dyn DocumentStore>,
    /// Overrides the compressor derived from the config
    pub compressor: Option<Arc<dyn Compressor>>,
}

impl SessionDeps {
    pub fn new(
        store: Arc<dyn LocalStore>,
        uploader: Arc<dyn RemoteUploader>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            store,
            uploader,
            documents,
            compressor: None,
        }
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }
}

/// Which document a session edits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTarget {
    New,
    Existing(DocumentId),
}

impl SessionTarget {
    /// Document id used for the legacy draft key
    fn legacy_id(&self) -> Option<&str> {
        match self {
            SessionTarget::New => None,
            SessionTarget::Existing(id) => Some(id.as_str()),
        }
    }
}

/// Result of [`EditorSession::start_new`]
pub struct SessionStart {
    pub session: EditorSession,
    /// Whether a cached draft was restored
    pub restored: bool,
}

/// Result of a successful save
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub document_id: DocumentId,
    /// True when the document was created rather than updated
    pub created: bool,
    pub payload: DocumentPayload,
    pub uploaded: usize,
    /// Staged content images whose reference was not in the body
    pub mismatches: Vec<ImageId>,
}

struct SessionState {
    target: SessionTarget,
    document: DraftDocument,
    registry: ImageRegistry,
    /// Bumped by every mutation
    revision: u64,
}

/// Clears the in-flight flag when a save ends, however it ends
struct SaveGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SaveGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for SaveGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct EditorSession {
    config: DraftConfig,
    store: Arc<dyn LocalStore>,
    documents: Arc<dyn DocumentStore>,
    staging: StagingManager,
    drafts: DraftStore,
    reconciler: UploadReconciler,
    state: Mutex<SessionState>,
    save_in_flight: AtomicBool,
}

impl EditorSession {
    fn build(
        deps: SessionDeps,
        config: DraftConfig,
        target: SessionTarget,
        document: DraftDocument,
    ) -> Self {
        let compressor = deps
            .compressor
            .unwrap_or_else(|| compressor_for(&config.compression));

        Self {
            staging: StagingManager::new(deps.store.clone(), compressor),
            drafts: DraftStore::new(deps.store.clone()),
            reconciler: UploadReconciler::new(deps.uploader, config.reference_mode),
            store: deps.store,
            documents: deps.documents,
            config,
            state: Mutex::new(SessionState {
                target,
                document,
                registry: ImageRegistry::new(),
                revision: 0,
            }),
            save_in_flight: AtomicBool::new(false),
        }
    }

    /// Start composing a new document, restoring a cached draft if one exists
    ///
    /// A store failure while restoring counts as "no draft".
    pub async fn start_new(deps: SessionDeps, config: DraftConfig) -> SessionStart {
        let session = Self::build(deps, config, SessionTarget::New, DraftDocument::default());

        let snapshot = match session.drafts.restore().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Could not read cached draft, starting empty");
                None
            }
        };

        let Some(snapshot) = snapshot else {
            return SessionStart {
                session,
                restored: false,
            };
        };

        let images = session.load_images(&snapshot).await;
        {
            let mut state = session.state.lock().await;
            state.registry = ImageRegistry::from_images(images);
            state.document = DraftDocument::from_snapshot(snapshot);
            if let Some(cover) = state.document.cover.staged_id() {
                if !state.registry.contains(cover) {
                    state.document.cover = CoverState::None;
                }
            }
            info!(
                title = %state.document.title,
                images = state.registry.len(),
                "Restored draft"
            );
        }

        SessionStart {
            session,
            restored: true,
        }
    }

    /// Edit a document that already exists remotely; never restores a draft
    pub async fn open_existing(
        deps: SessionDeps,
        config: DraftConfig,
        id: DocumentId,
    ) -> SessionResult<Self> {
        let payload = deps.documents.fetch(&id).await?;
        debug!(document = %id, "Opened existing document");
        let document = DraftDocument::from_payload(payload);
        Ok(Self::build(deps, config, SessionTarget::Existing(id), document))
    }

    async fn load_images(&self, snapshot: &DraftSnapshot) -> Vec<CachedImage> {
        let mut ids: Vec<&ImageId> = snapshot.local_image_ids.iter().collect();
        if let Some(cover) = snapshot.cover.staged_id() {
            if !ids.contains(&cover) {
                ids.push(cover);
            }
        }

        let mut images = Vec::with_capacity(ids.len());
        for id in ids {
            match self.store.get_image(id).await {
                Ok(Some(image)) => images.push(image),
                Ok(None) => warn!(id = %id, "Staged image vanished before restore"),
                Err(e) => warn!(id = %id, error = %e, "Could not load staged image"),
            }
        }
        images
    }

    pub fn config(&self) -> &DraftConfig {
        &self.config
    }

    pub async fn target(&self) -> SessionTarget {
        self.state.lock().await.target.clone()
    }

    pub async fn document(&self) -> DraftDocument {
        self.state.lock().await.document.clone()
    }

    /// Snapshot of the current state, as it would be persisted
    pub async fn snapshot(&self) -> DraftSnapshot {
        let state = self.state.lock().await;
        state.document.to_snapshot(state.registry.ids())
    }

    /// Every staged image, content first, cover last
    pub async fn staged_images(&self) -> Vec<CachedImage> {
        self.state.lock().await.registry.iter().cloned().collect()
    }

    pub fn is_saving(&self) -> bool {
        self.save_in_flight.load(Ordering::Acquire)
    }

    /// The string to embed in the body for `image`
    pub fn body_reference(&self, image: &CachedImage) -> String {
        self.config.reference_mode.body_reference(image)
    }

    /// Body with placeholder tokens expanded to inline data, ready to render
    pub async fn preview_body(&self) -> String {
        let state = self.state.lock().await;
        if self.config.reference_mode == ReferenceMode::InlineData {
            return state.document.content_body.clone();
        }

        let pairs: Vec<(String, String)> = state
            .registry
            .iter()
            .map(|image| {
                (
                    placeholder(image.id()),
                    image.record().inline_reference.as_str().to_string(),
                )
            })
            .collect();
        replace_literals(&state.document.content_body, &pairs).0
    }

    pub async fn set_content<S: Into<String>>(&self, body: S) -> SessionResult<()> {
        let body = body.into();
        self.mutate(|document, _| document.content_body = body).await
    }

    /// Set the title; the slug follows it
    pub async fn set_title<S: Into<String>>(&self, title: S) -> SessionResult<()> {
        let title = title.into();
        self.mutate(|document, _| document.set_title(title)).await
    }

    pub async fn set_slug<S: Into<String>>(&self, slug: S) -> SessionResult<()> {
        let slug = slug.into();
        self.mutate(|document, _| document.slug = slug).await
    }

    /// Returns false for empty or duplicate tags
    pub async fn add_tag(&self, tag: &str) -> SessionResult<bool> {
        let mut added = false;
        self.mutate(|document, _| added = document.add_tag(tag)).await?;
        Ok(added)
    }

    pub async fn remove_tag(&self, tag: &str) -> SessionResult<bool> {
        let mut removed = false;
        self.mutate(|document, _| removed = document.remove_tag(tag)).await?;
        Ok(removed)
    }

    pub async fn set_published(&self, published: bool) -> SessionResult<()> {
        self.mutate(|document, _| document.published = published).await
    }

    /// Stage content images in order; failed files are reported, not fatal
    ///
    /// Inserting the returned images' [`body_reference`](Self::body_reference)
    /// into the body is up to the caller.
    pub async fn stage_images(&self, files: Vec<SourceFile>) -> SessionResult<StageReport> {
        let report = self.staging.stage_all(files, ImageRole::Content).await;
        if !report.staged.is_empty() {
            let staged = report.staged.clone();
            self.mutate(|_, registry| {
                for image in staged {
                    registry.insert(image);
                }
            })
            .await?;
        }
        Ok(report)
    }

    /// Stage a new cover, replacing (and unstaging) any previous one
    pub async fn stage_cover(&self, file: SourceFile) -> SessionResult<CachedImage> {
        let image = self.staging.stage(file, ImageRole::Cover).await?;

        let mut replaced = None;
        let cover = image.clone();
        self.mutate(|document, registry| {
            document.cover = CoverState::Staged(cover.id().clone());
            replaced = registry.insert(cover);
        })
        .await?;

        if let Some(previous) = replaced {
            self.unstage_quietly(previous.id()).await;
        }
        Ok(image)
    }

    pub async fn remove_cover(&self) -> SessionResult<()> {
        let mut removed = None;
        self.mutate(|document, registry| {
            document.cover = CoverState::None;
            removed = registry.take_cover();
        })
        .await?;

        if let Some(previous) = removed {
            self.unstage_quietly(previous.id()).await;
        }
        Ok(())
    }

    /// Forget a staged image; removing its reference from the body is up to
    /// the caller
    pub async fn remove_image(&self, id: &ImageId) -> SessionResult<()> {
        {
            let state = self.state.lock().await;
            if !state.registry.contains(id) {
                return Err(SessionError::UnknownImage { id: id.to_string() });
            }
        }

        self.mutate(|document, registry| {
            if document.cover.staged_id() == Some(id) {
                document.cover = CoverState::None;
            }
            registry.remove(id);
        })
        .await?;

        self.staging.unstage(id).await?;
        Ok(())
    }

    async fn unstage_quietly(&self, id: &ImageId) {
        if let Err(e) = self.staging.unstage(id).await {
            warn!(id = %id, error = %e, "Failed to unstage replaced image");
        }
    }

    /// Apply `change` and commit a full snapshot
    async fn mutate<F>(&self, change: F) -> SessionResult<()>
    where
        F: FnOnce(&mut DraftDocument, &mut ImageRegistry),
    {
        let mut state = self.state.lock().await;
        let state = &mut *state;
        change(&mut state.document, &mut state.registry);
        state.revision += 1;
        self.persist(state).await?;
        Ok(())
    }

    async fn persist(&self, state: &SessionState) -> BlobResult<DraftSnapshot> {
        let snapshot = state.document.to_snapshot(state.registry.ids());
        match &state.target {
            SessionTarget::New => self.drafts.save(snapshot).await,
            SessionTarget::Existing(id) => {
                self.drafts.save_legacy(Some(id.as_str()), snapshot).await
            }
        }
    }

    /// Upload staged images, rewrite the body and submit the document
    ///
    /// A second call while one is pending fails with
    /// [`SaveError::InFlight`]. A body still embedding local references that
    /// no staged image answers for fails with
    /// [`SaveError::UnresolvedReferences`] before anything is uploaded. On
    /// any failure nothing local is touched, so the author can retry.
    #[instrument(skip(self))]
    pub async fn save(&self) -> Result<SaveOutcome, SaveError> {
        let Some(_guard) = SaveGuard::acquire(&self.save_in_flight) else {
            warn!("Save requested while another is in flight");
            return Err(SaveError::InFlight);
        };

        let (target, document, registry, revision) = {
            let state = self.state.lock().await;
            (
                state.target.clone(),
                state.document.clone(),
                state.registry.clone(),
                state.revision,
            )
        };

        let unresolved = unresolved_references(
            &document.content_body,
            &registry,
            self.config.reference_mode,
        );
        if unresolved > 0 {
            warn!(count = unresolved, "Body references images that are not staged");
            return Err(SaveError::UnresolvedReferences { count: unresolved });
        }

        let mapping = self
            .reconciler
            .reconcile(registry.cover(), registry.content())
            .await?;

        let rewrite = ContentRewriter::rewrite(&document.content_body, &mapping);
        if !rewrite.mismatches.is_empty() {
            warn!(count = rewrite.mismatches.len(), "Uploaded images not found in body");
        }

        let payload = build_payload(&document, &mapping, rewrite.body);

        let (document_id, created) = match &target {
            SessionTarget::New => {
                let id = self
                    .documents
                    .create(payload.clone())
                    .await
                    .map_err(|source| SaveError::Submission { source })?;
                (id, true)
            }
            SessionTarget::Existing(id) => {
                self.documents
                    .update(id, payload.clone())
                    .await
                    .map_err(|source| SaveError::Submission { source })?;
                (id.clone(), false)
            }
        };

        info!(document = %document_id, created, uploaded = mapping.len(), "Document saved");
        self.commit(&target, &document_id, &mapping, revision).await;

        Ok(SaveOutcome {
            document_id,
            created,
            payload,
            uploaded: mapping.len(),
            mismatches: rewrite.mismatches,
        })
    }

    /// Fold an acknowledged save into the session and purge local state
    ///
    /// Purge failures are logged; the remote document already exists.
    async fn commit(
        &self,
        previous: &SessionTarget,
        document_id: &DocumentId,
        mapping: &UploadMapping,
        revision: u64,
    ) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let live_body = ContentRewriter::rewrite(&state.document.content_body, mapping).body;
        state.document.content_body = live_body;
        if let Some(cover) = &mapping.cover {
            if state.document.cover.staged_id() == Some(&cover.image_id) {
                state.document.cover = CoverState::Remote(cover.remote.clone());
            }
        }
        state.document.images.extend(mapping.content_descriptors());

        for entry in mapping.entries() {
            state.registry.remove(&entry.image_id);
        }
        state.target = SessionTarget::Existing(document_id.clone());

        // Other drafts over the same store keep their images
        for entry in mapping.entries() {
            if let Err(e) = self.store.delete_image(&entry.image_id).await {
                warn!(id = %entry.image_id, error = %e, "Failed to purge uploaded image");
            }
        }

        self.purge_drafts(previous).await;

        // Edits made while the save was pending get a fresh snapshot
        if state.revision != revision {
            debug!("Session changed during save, keeping a draft");
            if let Err(e) = self.persist(state).await {
                warn!(error = %e, "Failed to snapshot edits made during save");
            }
        }
    }

    async fn purge_drafts(&self, target: &SessionTarget) {
        if *target == SessionTarget::New {
            if let Err(e) = self.drafts.discard().await {
                warn!(error = %e, "Failed to clear draft after save");
            }
        }
        if let Err(e) = self.drafts.delete_legacy(target.legacy_id()).await {
            warn!(error = %e, "Failed to clear legacy draft after save");
        }
    }

    /// Throw the draft away along with every image it staged
    pub async fn discard(self) -> SessionResult<()> {
        let state = self.state.into_inner();
        for image in state.registry.iter() {
            self.staging.unstage(image.id()).await?;
        }
        if state.target == SessionTarget::New {
            self.drafts.discard().await?;
        }
        self.drafts.delete_legacy(state.target.legacy_id()).await?;
        info!("Discarded draft");
        Ok(())
    }
}

/// Local references in `body` that no staged image will replace
fn unresolved_references(body: &str, registry: &ImageRegistry, mode: ReferenceMode) -> usize {
    let known: HashSet<String> = registry.iter().map(|image| mode.body_reference(image)).collect();
    find_local_references(body)
        .into_iter()
        .filter(|reference| !known.contains(*reference))
        .count()
}

fn build_payload(
    document: &DraftDocument,
    mapping: &UploadMapping,
    content_body: String,
) -> DocumentPayload {
    let cover_image = match (&mapping.cover, &document.cover) {
        (Some(entry), _) => Some(entry.remote.clone()),
        (None, CoverState::Remote(remote)) => Some(remote.clone()),
        (None, _) => None,
    };

    let mut images = document.images.clone();
    images.extend(mapping.content_descriptors());

    DocumentPayload {
        title: document.title.clone(),
        slug: document.slug.clone(),
        content_body,
        cover_image,
        images,
        tags: document.tags.clone(),
        published: document.published,
    }
}
