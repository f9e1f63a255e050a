//! Document model and the remote document collaborator.

use std::fmt;

use async_trait::async_trait;
use inkdraft_blob::{now_millis, CoverState, DraftSnapshot, ImageId, RemoteDescriptor};
use serde::{Deserialize, Serialize};

use crate::error::DocumentError;

/// Identifier assigned by the remote document store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What gets submitted on create and update
///
/// `content_body` holds remote URLs only, never local references.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPayload {
    pub title: String,
    pub slug: String,
    pub content_body: String,
    pub cover_image: Option<RemoteDescriptor>,
    pub images: Vec<RemoteDescriptor>,
    pub tags: Vec<String>,
    pub published: bool,
}

/// Remote document store collaborator
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create(&self, payload: DocumentPayload) -> Result<DocumentId, DocumentError>;

    async fn update(&self, id: &DocumentId, payload: DocumentPayload) -> Result<(), DocumentError>;

    async fn fetch(&self, id: &DocumentId) -> Result<DocumentPayload, DocumentError>;
}

/// Editable state of the document being composed
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DraftDocument {
    pub title: String,
    pub slug: String,
    pub content_body: String,
    pub tags: Vec<String>,
    pub cover: CoverState,
    pub published: bool,
    /// Images already uploaded by earlier saves
    pub images: Vec<RemoteDescriptor>,
}

impl DraftDocument {
    pub fn from_snapshot(snapshot: DraftSnapshot) -> Self {
        Self {
            title: snapshot.title,
            slug: snapshot.slug,
            content_body: snapshot.content_body,
            tags: snapshot.tags,
            cover: snapshot.cover,
            published: snapshot.published,
            images: Vec::new(),
        }
    }

    pub fn from_payload(payload: DocumentPayload) -> Self {
        Self {
            title: payload.title,
            slug: payload.slug,
            content_body: payload.content_body,
            tags: payload.tags,
            cover: payload.cover_image.map_or(CoverState::None, CoverState::Remote),
            published: payload.published,
            images: payload.images,
        }
    }

    pub fn to_snapshot(&self, local_image_ids: Vec<ImageId>) -> DraftSnapshot {
        DraftSnapshot {
            title: self.title.clone(),
            slug: self.slug.clone(),
            content_body: self.content_body.clone(),
            tags: self.tags.clone(),
            cover: self.cover.clone(),
            local_image_ids,
            published: self.published,
            saved_at_ms: now_millis(),
        }
    }

    /// Set the title and derive the slug from it
    pub fn set_title<S: Into<String>>(&mut self, title: S) {
        self.title = title.into();
        self.slug = slugify(&self.title);
    }

    /// Add a trimmed tag; empty and duplicate tags are ignored
    pub fn add_tag(&mut self, raw: &str) -> bool {
        let tag = raw.trim();
        if tag.is_empty() || self.tags.iter().any(|t| t == tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag.trim());
        self.tags.len() != before
    }
}

/// Lowercase, collapse every run of non `[a-z0-9]` into `-`, trim dashes
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}
