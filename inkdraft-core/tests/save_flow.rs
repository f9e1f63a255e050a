mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{deps, png_file, MemoryDocuments, RecordingUploader};
use inkdraft_blob::PLACEHOLDER_SCHEME;
use inkdraft_core::prelude::*;
use inkdraft_core::{ImageCompressor, SavePhase, SessionTarget};

fn inline_config() -> DraftConfig {
    DraftConfig::default().with_reference_mode(ReferenceMode::InlineData)
}

async fn new_session(
    store: &MemoryLocalStore,
    uploader: &Arc<RecordingUploader>,
    documents: &Arc<MemoryDocuments>,
    config: DraftConfig,
) -> SessionStart {
    let deps = deps(Arc::new(store.clone()), uploader.clone(), documents.clone());
    EditorSession::start_new(deps, config).await
}

#[test_log::test(tokio::test)]
async fn cover_and_content_are_rewritten_to_their_own_urls() {
    let store = MemoryLocalStore::new();
    let uploader = RecordingUploader::scripted(&["https://x/1"], &["https://x/2"]);
    let documents = MemoryDocuments::new();
    let SessionStart { session, restored } =
        new_session(&store, &uploader, &documents, inline_config()).await;
    assert!(!restored);

    let report = session.stage_images(vec![png_file("f1.png", b"first")]).await.unwrap();
    let f1 = &report.staged[0];
    session.stage_cover(png_file("f2.png", b"second")).await.unwrap();

    let ref1 = session.body_reference(f1);
    assert!(ref1.starts_with("data:image/png;base64,"));
    session
        .set_content(format!("<img src='{ref1}'><img src='{ref1}'>"))
        .await
        .unwrap();

    let outcome = session.save().await.unwrap();

    assert!(outcome.created);
    assert_eq!(outcome.uploaded, 2);
    assert!(outcome.mismatches.is_empty());
    assert_eq!(
        outcome.payload.content_body,
        "<img src='https://x/2'><img src='https://x/2'>"
    );
    assert_eq!(outcome.payload.cover_image.as_ref().unwrap().url, "https://x/1");
    assert_eq!(outcome.payload.images.len(), 1);
    assert_eq!(outcome.payload.images[0].url, "https://x/2");

    let mut batch_sizes: Vec<usize> = uploader.batches().iter().map(Vec::len).collect();
    batch_sizes.sort();
    assert_eq!(batch_sizes, vec![1, 1]);

    // Everything local is purged once the document is acknowledged
    assert!(store.is_empty());
    assert_eq!(documents.get(&outcome.document_id).unwrap(), outcome.payload);
}

#[tokio::test]
async fn placeholders_are_replaced_and_previewed() {
    let store = MemoryLocalStore::new();
    let uploader = RecordingUploader::new();
    let documents = MemoryDocuments::new();
    let session = new_session(&store, &uploader, &documents, DraftConfig::default())
        .await
        .session;

    let report = session
        .stage_images(vec![png_file("a.png", b"aaa"), png_file("b.png", b"bbb")])
        .await
        .unwrap();
    let a = &report.staged[0];
    let b = &report.staged[1];
    let body = format!(
        "<img src=\"{}\"><p>text</p><img src=\"{}\">",
        session.body_reference(a),
        session.body_reference(b)
    );
    session.set_content(body).await.unwrap();

    let preview = session.preview_body().await;
    assert!(preview.contains(a.record().inline_reference.as_str()));
    assert!(!preview.contains(PLACEHOLDER_SCHEME));

    let outcome = session.save().await.unwrap();
    let expected = format!(
        "<img src=\"https://cdn.test/{}\"><p>text</p><img src=\"https://cdn.test/{}\">",
        a.id(),
        b.id()
    );
    assert_eq!(outcome.payload.content_body, expected);
    assert_eq!(session.document().await.content_body, expected);
    assert_eq!(
        session.target().await,
        SessionTarget::Existing(outcome.document_id.clone())
    );
}

#[tokio::test]
async fn second_save_is_rejected_while_first_is_pending() {
    let store = MemoryLocalStore::new();
    let uploader = RecordingUploader::new();
    let documents = MemoryDocuments::gated();
    let session = Arc::new(
        new_session(&store, &uploader, &documents, DraftConfig::default())
            .await
            .session,
    );
    session.set_title("Racing saves").await.unwrap();

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.save().await }
    });

    documents.entered().await;
    assert!(session.is_saving());

    let second = session.save().await;
    let err = second.unwrap_err();
    assert!(matches!(err, SaveError::InFlight));
    assert_eq!(err.phase(), SavePhase::Guard);

    documents.release();
    let outcome = first.await.unwrap().unwrap();
    assert!(outcome.created);
    assert_eq!(documents.creates(), 1);
    assert!(!session.is_saving());

    // The guard is released, so the next save goes through as an update
    documents.release();
    let again = session.save().await.unwrap();
    assert!(!again.created);
    assert_eq!(again.document_id, outcome.document_id);
    assert_eq!(documents.creates(), 1);
    assert_eq!(documents.updates(), 1);
}

#[tokio::test]
async fn restore_reproduces_the_last_snapshot() {
    let store = MemoryLocalStore::new();
    let uploader = RecordingUploader::new();
    let documents = MemoryDocuments::new();

    let title = "Ünïcode — title ✓";
    let body = "<p>two  spaces\tand a tab</p>\n<img src=\"local-image://x\">";
    {
        let session = new_session(&store, &uploader, &documents, DraftConfig::default())
            .await
            .session;
        session.set_title(title).await.unwrap();
        assert!(session.add_tag(" zeta ").await.unwrap());
        assert!(session.add_tag("alpha").await.unwrap());
        assert!(!session.add_tag("zeta").await.unwrap());
        session.stage_images(vec![png_file("a.png", b"a")]).await.unwrap();
        session.stage_cover(png_file("c.png", b"c")).await.unwrap();
        session.set_content(body).await.unwrap();
    }

    let SessionStart { session, restored } =
        new_session(&store, &uploader, &documents, DraftConfig::default()).await;
    assert!(restored);

    let document = session.document().await;
    assert_eq!(document.title, title);
    assert_eq!(document.slug, "n-code-title");
    assert_eq!(document.tags, vec!["zeta", "alpha"]);
    assert_eq!(document.content_body, body);
    assert!(matches!(document.cover, CoverState::Staged(_)));

    let staged = session.staged_images().await;
    assert_eq!(staged.len(), 2);
    assert!(staged[1].is_cover());
}

#[tokio::test]
async fn restore_survives_a_filesystem_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let uploader = RecordingUploader::new();
    let documents = MemoryDocuments::new();

    {
        let store = FsLocalStore::open(dir.path()).await.unwrap();
        let deps = deps(Arc::new(store), uploader.clone(), documents.clone());
        let session = EditorSession::start_new(deps, DraftConfig::default()).await.session;
        session.set_title("On disk").await.unwrap();
        session.set_content("<p>persisted</p>").await.unwrap();
    }

    let store = FsLocalStore::open(dir.path()).await.unwrap();
    let deps = deps(Arc::new(store), uploader, documents);
    let SessionStart { session, restored } =
        EditorSession::start_new(deps, DraftConfig::default()).await;

    assert!(restored);
    assert_eq!(session.document().await.content_body, "<p>persisted</p>");
}

#[tokio::test]
async fn upload_failure_leaves_local_state_for_retry() {
    let store = MemoryLocalStore::new();
    let uploader = RecordingUploader::new();
    let documents = MemoryDocuments::new();
    let session = new_session(&store, &uploader, &documents, DraftConfig::default())
        .await
        .session;

    let report = session.stage_images(vec![png_file("a.png", b"a")]).await.unwrap();
    session
        .set_content(session.body_reference(&report.staged[0]))
        .await
        .unwrap();
    uploader.fail_content.store(true, Ordering::SeqCst);

    let err = session.save().await.unwrap_err();
    assert_eq!(err.phase(), SavePhase::ContentUpload);
    assert_eq!(err.user_message(), "Failed to upload content images");
    assert_eq!(documents.creates(), 0);
    assert_eq!(store.get_all_images().await.unwrap().len(), 1);
    assert!(store.get(&StoreKey::CurrentDraft).await.unwrap().is_some());

    uploader.fail_content.store(false, Ordering::SeqCst);
    let outcome = session.save().await.unwrap();
    assert_eq!(outcome.uploaded, 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn cover_failure_is_reported_as_cover() {
    let store = MemoryLocalStore::new();
    let uploader = RecordingUploader::new();
    let documents = MemoryDocuments::new();
    let session = new_session(&store, &uploader, &documents, DraftConfig::default())
        .await
        .session;

    session.stage_cover(png_file("c.png", b"c")).await.unwrap();
    uploader.fail_cover.store(true, Ordering::SeqCst);

    let err = session.save().await.unwrap_err();
    assert!(matches!(err, SaveError::CoverUpload { .. }));
    assert_eq!(err.user_message(), "Failed to upload cover image");
    assert_eq!(store.get_all_images().await.unwrap().len(), 1);
}

#[tokio::test]
async fn submission_failure_keeps_cache() {
    let store = MemoryLocalStore::new();
    let uploader = RecordingUploader::new();
    let documents = MemoryDocuments::new();
    documents.fail.store(true, Ordering::SeqCst);
    let session = new_session(&store, &uploader, &documents, DraftConfig::default())
        .await
        .session;

    session.stage_images(vec![png_file("a.png", b"a")]).await.unwrap();
    let err = session.save().await.unwrap_err();

    assert_eq!(err.phase(), SavePhase::Submission);
    assert_eq!(uploader.uploaded_files(), 1);
    assert_eq!(store.get_all_images().await.unwrap().len(), 1);
    assert_eq!(session.target().await, SessionTarget::New);
}

#[tokio::test]
async fn existing_documents_never_restore_and_update_in_place() {
    let store = MemoryLocalStore::new();
    let stale = DraftSnapshot {
        title: "cached new draft".to_string(),
        ..Default::default()
    };
    store.put(&StoreKey::CurrentDraft, StoredRecord::draft(stale)).await.unwrap();

    let remote = DocumentPayload {
        title: "Published".to_string(),
        slug: "published".to_string(),
        content_body: "<p>old</p>".to_string(),
        cover_image: Some(RemoteDescriptor::new("https://cdn.test/cover", "cover")),
        images: vec![RemoteDescriptor::new("https://cdn.test/old", "old")],
        tags: vec!["kept".to_string()],
        published: true,
    };
    let documents = MemoryDocuments::with_document("doc-9", remote);
    let uploader = RecordingUploader::new();
    let deps = deps(Arc::new(store.clone()), uploader.clone(), documents.clone());

    let session =
        EditorSession::open_existing(deps, DraftConfig::default(), DocumentId::new("doc-9"))
            .await
            .unwrap();
    assert_eq!(session.document().await.title, "Published");

    let report = session.stage_images(vec![png_file("new.png", b"n")]).await.unwrap();
    let reference = session.body_reference(&report.staged[0]);
    session
        .set_content(format!("<p>old</p><img src=\"{reference}\">"))
        .await
        .unwrap();
    assert!(store
        .get(&StoreKey::legacy_draft(Some("doc-9")))
        .await
        .unwrap()
        .is_some());

    let outcome = session.save().await.unwrap();
    assert!(!outcome.created);
    assert_eq!(documents.updates(), 1);
    assert_eq!(outcome.payload.cover_image.unwrap().url, "https://cdn.test/cover");
    assert_eq!(outcome.payload.images.len(), 2);

    // The new-document draft belongs to another session and stays put
    assert!(store.get(&StoreKey::CurrentDraft).await.unwrap().is_some());
    assert!(store
        .get(&StoreKey::legacy_draft(Some("doc-9")))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn saving_one_document_keeps_another_drafts_images() {
    let store = MemoryLocalStore::new();
    let uploader = RecordingUploader::new();
    let documents = MemoryDocuments::with_document("doc-9", DocumentPayload::default());

    let unsaved = new_session(&store, &uploader, &documents, DraftConfig::default())
        .await
        .session;
    let report = unsaved.stage_images(vec![png_file("keep.png", b"keep")]).await.unwrap();
    let kept = report.staged[0].clone();
    unsaved
        .set_content(format!("<img src=\"{}\">", unsaved.body_reference(&kept)))
        .await
        .unwrap();

    let deps = deps(Arc::new(store.clone()), uploader.clone(), documents.clone());
    let editing =
        EditorSession::open_existing(deps, DraftConfig::default(), DocumentId::new("doc-9"))
            .await
            .unwrap();
    let report = editing.stage_images(vec![png_file("post.png", b"post")]).await.unwrap();
    let posted = report.staged[0].clone();
    editing
        .set_content(format!("<img src=\"{}\">", editing.body_reference(&posted)))
        .await
        .unwrap();
    editing.save().await.unwrap();

    assert!(store.get_image(posted.id()).await.unwrap().is_none());
    assert!(store.get_image(kept.id()).await.unwrap().is_some());

    let SessionStart { session, restored } =
        new_session(&store, &uploader, &documents, DraftConfig::default()).await;
    assert!(restored);
    assert_eq!(session.snapshot().await.local_image_ids, vec![kept.id().clone()]);
    assert_eq!(session.staged_images().await, vec![kept]);
}

#[tokio::test]
async fn save_rejects_references_to_images_no_longer_staged() {
    let store = MemoryLocalStore::new();
    let uploader = RecordingUploader::new();
    let documents = MemoryDocuments::new();
    let session = new_session(&store, &uploader, &documents, DraftConfig::default())
        .await
        .session;

    let report = session
        .stage_images(vec![png_file("a.png", b"a"), png_file("b.png", b"b")])
        .await
        .unwrap();
    let (a, b) = (&report.staged[0], &report.staged[1]);
    let kept = format!("<img src=\"{}\">", session.body_reference(b));
    let body = format!("<img src=\"{}\">{kept}", session.body_reference(a));
    session.set_content(body).await.unwrap();
    session.remove_image(a.id()).await.unwrap();

    let err = session.save().await.unwrap_err();
    assert!(matches!(err, SaveError::UnresolvedReferences { count: 1 }));
    assert_eq!(err.phase(), SavePhase::Validation);
    assert_eq!(uploader.uploaded_files(), 0);
    assert_eq!(documents.creates(), 0);
    assert_eq!(store.get_all_images().await.unwrap().len(), 1);
    assert!(store.get(&StoreKey::CurrentDraft).await.unwrap().is_some());

    session.set_content(kept).await.unwrap();
    let outcome = session.save().await.unwrap();
    assert!(!outcome.payload.content_body.contains(PLACEHOLDER_SCHEME));
    assert_eq!(
        outcome.payload.content_body,
        format!("<img src=\"https://cdn.test/{}\">", b.id())
    );
}

#[tokio::test]
async fn save_rejects_inline_data_left_over_from_removed_images() {
    let store = MemoryLocalStore::new();
    let uploader = RecordingUploader::new();
    let documents = MemoryDocuments::new();
    let session = new_session(&store, &uploader, &documents, inline_config())
        .await
        .session;

    let report = session.stage_images(vec![png_file("a.png", b"a")]).await.unwrap();
    let reference = session.body_reference(&report.staged[0]);
    assert!(reference.starts_with("data:"));
    session
        .set_content(format!("<img src='{reference}'>"))
        .await
        .unwrap();
    session.remove_image(report.staged[0].id()).await.unwrap();

    let err = session.save().await.unwrap_err();
    assert!(matches!(err, SaveError::UnresolvedReferences { count: 1 }));
    assert_eq!(documents.creates(), 0);
}

#[tokio::test]
async fn missing_existing_document_is_an_error() {
    let deps = deps(
        Arc::new(MemoryLocalStore::new()),
        RecordingUploader::new(),
        MemoryDocuments::new(),
    );
    let result =
        EditorSession::open_existing(deps, DraftConfig::default(), DocumentId::new("nope")).await;
    assert!(matches!(
        result,
        Err(SessionError::Document {
            source: DocumentError::NotFound { .. }
        })
    ));
}

#[tokio::test]
async fn edits_during_save_are_kept_as_a_draft() {
    let store = MemoryLocalStore::new();
    let uploader = RecordingUploader::new();
    let documents = MemoryDocuments::gated();
    let session = Arc::new(
        new_session(&store, &uploader, &documents, DraftConfig::default())
            .await
            .session,
    );
    session.set_title("Before").await.unwrap();

    let save = tokio::spawn({
        let session = session.clone();
        async move { session.save().await }
    });
    documents.entered().await;
    session.set_title("After").await.unwrap();
    documents.release();

    let outcome = save.await.unwrap().unwrap();
    assert_eq!(outcome.payload.title, "Before");

    let drafts = DraftStore::new(Arc::new(store.clone()));
    assert!(drafts.restore().await.unwrap().is_none());
    let kept = drafts
        .get_legacy(Some(outcome.document_id.as_str()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kept.title, "After");
}

#[tokio::test]
async fn compression_fallback_stores_original_bytes() {
    let store = MemoryLocalStore::new();
    let deps = deps(
        Arc::new(store.clone()),
        RecordingUploader::new(),
        MemoryDocuments::new(),
    )
    .with_compressor(Arc::new(ImageCompressor::default()));
    let session = EditorSession::start_new(deps, DraftConfig::default()).await.session;

    let raw = png_file("corrupt.png", b"not really a png");
    let report = session.stage_images(vec![raw.clone()]).await.unwrap();
    assert!(report.is_clean());

    let cached = store.get_image(report.staged[0].id()).await.unwrap().unwrap();
    assert_eq!(cached.record().blob.bytes, raw.bytes);
    assert_eq!(cached.record().inline_reference.decode().unwrap().bytes, raw.bytes);
}

#[tokio::test]
async fn removing_images_and_discarding() {
    let store = MemoryLocalStore::new();
    let uploader = RecordingUploader::new();
    let documents = MemoryDocuments::new();
    let session = new_session(&store, &uploader, &documents, DraftConfig::default())
        .await
        .session;

    let report = session
        .stage_images(vec![
            png_file("a.png", b"a"),
            SourceFile::new("notes.txt", "text/plain", b"hi".to_vec()),
            png_file("b.png", b"b"),
        ])
        .await
        .unwrap();
    assert_eq!(report.staged.len(), 2);
    assert_eq!(report.failures[0].file_name, "notes.txt");

    let first_cover = session.stage_cover(png_file("c1.png", b"c1")).await.unwrap();
    let second_cover = session.stage_cover(png_file("c2.png", b"c2")).await.unwrap();
    assert!(store.get_image(first_cover.id()).await.unwrap().is_none());
    assert_eq!(
        session.document().await.cover,
        CoverState::Staged(second_cover.id().clone())
    );

    session.remove_image(report.staged[0].id()).await.unwrap();
    assert!(matches!(
        session.remove_image(report.staged[0].id()).await,
        Err(SessionError::UnknownImage { .. })
    ));
    session.remove_cover().await.unwrap();

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.local_image_ids, vec![report.staged[1].id().clone()]);
    assert_eq!(snapshot.cover, CoverState::None);
    assert_eq!(store.get_all_images().await.unwrap().len(), 1);

    session.discard().await.unwrap();
    assert!(store.is_empty());
}
