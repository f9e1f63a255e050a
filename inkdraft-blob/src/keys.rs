use std::fmt;

use crate::{BlobError, BlobResult, ImageId};

/// Namespace holding staged images
pub const IMAGES_NAMESPACE: &str = "images:";

/// Namespace holding draft snapshots (current and legacy)
pub const DRAFTS_NAMESPACE: &str = "draft:";

const CURRENT_DRAFT: &str = "current";
const NEW_DOCUMENT: &str = "new";

/// Key of a value in the local store
///
/// Renders to `images:<id>`, `draft:current` or `draft:<documentId|new>`.
/// A legacy draft for a document whose id is literally `current` is the
/// current draft, and one for `new` is the new-document draft; see
/// [`StoreKey::normalized`]. Backends store keys in normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKey {
    Image(ImageId),
    CurrentDraft,
    /// Per-document draft; `None` is a document that does not exist yet
    LegacyDraft(Option<String>),
}

impl StoreKey {
    pub fn image(id: &ImageId) -> Self {
        Self::Image(id.clone())
    }

    pub fn legacy_draft(document_id: Option<&str>) -> Self {
        Self::LegacyDraft(document_id.map(str::to_string)).normalized()
    }

    /// Collapse spellings that render to the same key into the one
    /// [`StoreKey::parse`] returns
    pub fn normalized(self) -> Self {
        match self {
            Self::LegacyDraft(Some(id)) if id == CURRENT_DRAFT => Self::CurrentDraft,
            Self::LegacyDraft(Some(id)) if id == NEW_DOCUMENT => Self::LegacyDraft(None),
            other => other,
        }
    }

    /// Parse a rendered key back into a `StoreKey`
    pub fn parse(raw: &str) -> BlobResult<Self> {
        if let Some(id) = raw.strip_prefix(IMAGES_NAMESPACE) {
            if id.is_empty() {
                return Err(BlobError::invalid_key(raw));
            }
            return Ok(Self::Image(ImageId::from(id)));
        }

        match raw.strip_prefix(DRAFTS_NAMESPACE) {
            Some(CURRENT_DRAFT) => Ok(Self::CurrentDraft),
            Some(NEW_DOCUMENT) => Ok(Self::LegacyDraft(None)),
            Some(document_id) if !document_id.is_empty() => {
                Ok(Self::LegacyDraft(Some(document_id.to_string())))
            }
            _ => Err(BlobError::invalid_key(raw)),
        }
    }

    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Image(_) => IMAGES_NAMESPACE,
            Self::CurrentDraft | Self::LegacyDraft(_) => DRAFTS_NAMESPACE,
        }
    }

    pub fn image_id(&self) -> Option<&ImageId> {
        match self {
            Self::Image(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_draft(&self) -> bool {
        matches!(self, Self::CurrentDraft | Self::LegacyDraft(_))
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image(id) => write!(f, "{}{}", IMAGES_NAMESPACE, id),
            Self::CurrentDraft => write!(f, "{}{}", DRAFTS_NAMESPACE, CURRENT_DRAFT),
            Self::LegacyDraft(Some(document_id)) => {
                write!(f, "{}{}", DRAFTS_NAMESPACE, document_id)
            }
            Self::LegacyDraft(None) => write!(f, "{}{}", DRAFTS_NAMESPACE, NEW_DOCUMENT),
        }
    }
}
