use bytes::Bytes;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::InlineReference;

/// Version written into every persisted record envelope.
///
/// Records carrying any other version are treated as stale and read back as
/// absent rather than failing to parse.
pub const RECORD_SCHEMA_VERSION: u32 = 1;

const ID_SUFFIX_LEN: usize = 9;

/// Current wall-clock time in unix milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Whether a staged image belongs in the body or is the document cover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRole {
    Content,
    Cover,
}

impl ImageRole {
    fn id_prefix(&self) -> &'static str {
        match self {
            ImageRole::Content => "img",
            ImageRole::Cover => "cover",
        }
    }
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRole::Content => write!(f, "content"),
            ImageRole::Cover => write!(f, "cover"),
        }
    }
}

/// Local identifier of a staged image
///
/// Unique within a session with overwhelming probability, not globally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(pub String);

impl ImageId {
    /// Generate `<prefix>_<unix-millis>_<9 base-36 chars>`
    pub fn generate(role: ImageRole) -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..ID_SUFFIX_LEN)
            .map(|_| std::char::from_digit(rng.gen_range(0..36), 36).unwrap_or('0'))
            .collect();
        Self(format!("{}_{}_{}", role.id_prefix(), now_millis(), suffix))
    }

    /// Create from existing string
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ImageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Encoded image bytes plus their MIME type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    #[serde(with = "base64_bytes")]
    pub bytes: Bytes,
    pub mime_type: String,
}

impl EncodedImage {
    pub fn new<B: Into<Bytes>, S: Into<String>>(bytes: B, mime_type: S) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Shape shared by content and cover images
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: ImageId,
    pub blob: EncodedImage,
    pub inline_reference: InlineReference,
    pub original_name: String,
    pub byte_size: u64,
    /// Size of the file before compression
    pub original_size: u64,
    pub staged_at_ms: i64,
}

impl ImageRecord {
    /// Build a record whose inline reference is derived from `blob`
    pub fn new<S: Into<String>>(
        id: ImageId,
        blob: EncodedImage,
        original_name: S,
        original_size: u64,
    ) -> Self {
        let inline_reference = InlineReference::encode(&blob);
        Self {
            id,
            byte_size: blob.len() as u64,
            blob,
            inline_reference,
            original_name: original_name.into(),
            original_size,
            staged_at_ms: now_millis(),
        }
    }
}

/// A staged image as persisted under `images:<id>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", content = "image", rename_all = "snake_case")]
pub enum CachedImage {
    Content(ImageRecord),
    Cover(ImageRecord),
}

impl CachedImage {
    pub fn new(role: ImageRole, record: ImageRecord) -> Self {
        match role {
            ImageRole::Content => Self::Content(record),
            ImageRole::Cover => Self::Cover(record),
        }
    }

    pub fn record(&self) -> &ImageRecord {
        match self {
            Self::Content(record) | Self::Cover(record) => record,
        }
    }

    pub fn into_record(self) -> ImageRecord {
        match self {
            Self::Content(record) | Self::Cover(record) => record,
        }
    }

    pub fn id(&self) -> &ImageId {
        &self.record().id
    }

    pub fn role(&self) -> ImageRole {
        match self {
            Self::Content(_) => ImageRole::Content,
            Self::Cover(_) => ImageRole::Cover,
        }
    }

    pub fn is_cover(&self) -> bool {
        matches!(self, Self::Cover(_))
    }
}

/// Remote location of an uploaded image
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDescriptor {
    pub url: String,
    pub public_id: String,
}

impl RemoteDescriptor {
    pub fn new<U: Into<String>, P: Into<String>>(url: U, public_id: P) -> Self {
        Self {
            url: url.into(),
            public_id: public_id.into(),
        }
    }
}

/// Cover image of a draft
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum CoverState {
    #[default]
    None,
    /// Staged locally, not uploaded yet
    Staged(ImageId),
    /// Already lives at a remote location
    Remote(RemoteDescriptor),
}

impl CoverState {
    /// Staged id or remote url, if any
    pub fn reference(&self) -> Option<&str> {
        match self {
            CoverState::None => None,
            CoverState::Staged(id) => Some(id.as_str()),
            CoverState::Remote(remote) => Some(remote.url.as_str()),
        }
    }

    pub fn staged_id(&self) -> Option<&ImageId> {
        match self {
            CoverState::Staged(id) => Some(id),
            _ => None,
        }
    }
}

/// Full state of a draft, overwritten on every content-affecting edit
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DraftSnapshot {
    pub title: String,
    pub slug: String,
    pub content_body: String,
    /// Insertion ordered, no duplicates
    pub tags: Vec<String>,
    pub cover: CoverState,
    /// Staged images referenced by this draft, in staging order
    pub local_image_ids: Vec<ImageId>,
    #[serde(default)]
    pub published: bool,
    pub saved_at_ms: i64,
}

/// Payload of a persisted record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum RecordBody {
    Image(CachedImage),
    Draft(DraftSnapshot),
    LegacyDraft(DraftSnapshot),
}

impl RecordBody {
    pub fn into_image(self) -> Option<CachedImage> {
        match self {
            RecordBody::Image(image) => Some(image),
            _ => None,
        }
    }

    /// Draft snapshot from either the current or the legacy namespace
    pub fn into_draft(self) -> Option<DraftSnapshot> {
        match self {
            RecordBody::Draft(draft) | RecordBody::LegacyDraft(draft) => Some(draft),
            RecordBody::Image(_) => None,
        }
    }
}

/// Versioned envelope around every value in the local store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub schema_version: u32,
    pub body: RecordBody,
}

impl StoredRecord {
    pub fn new(body: RecordBody) -> Self {
        Self {
            schema_version: RECORD_SCHEMA_VERSION,
            body,
        }
    }

    pub fn image(image: CachedImage) -> Self {
        Self::new(RecordBody::Image(image))
    }

    pub fn draft(snapshot: DraftSnapshot) -> Self {
        Self::new(RecordBody::Draft(snapshot))
    }

    pub fn legacy_draft(snapshot: DraftSnapshot) -> Self {
        Self::new(RecordBody::LegacyDraft(snapshot))
    }

    pub fn is_current(&self) -> bool {
        self.schema_version == RECORD_SCHEMA_VERSION
    }

    /// Unwrap the body, discarding records written by another schema version
    pub fn into_current(self, key: &str) -> Option<RecordBody> {
        if self.is_current() {
            Some(self.body)
        } else {
            warn!(
                key,
                found = self.schema_version,
                expected = RECORD_SCHEMA_VERSION,
                "Discarding stale local record"
            );
            None
        }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
