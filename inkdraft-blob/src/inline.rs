//! Body-embeddable references to staged images.
//!
//! Two forms are supported:
//!
//! - [`InlineReference`]: a `data:<mime>;base64,<payload>` URL. It is
//!   self-describing and decodes back into the encoded bytes without any
//!   store lookup, so a body using it renders even before upload.
//! - [`placeholder`]: a `local-image://<id>` token. It is unique by
//!   construction, which keeps two staged copies of the same picture apart
//!   when the body is rewritten after upload.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{BlobError, BlobResult, EncodedImage, ImageId};

const DATA_SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// Scheme prefix of placeholder tokens
pub const PLACEHOLDER_SCHEME: &str = "local-image://";

/// Placeholder token for a staged image id
pub fn placeholder(id: &ImageId) -> String {
    format!("{}{}", PLACEHOLDER_SCHEME, id)
}

/// Image id carried by a placeholder token, if `token` is one
pub fn parse_placeholder(token: &str) -> Option<ImageId> {
    token
        .strip_prefix(PLACEHOLDER_SCHEME)
        .filter(|id| !id.is_empty())
        .map(ImageId::from)
}

/// Every placeholder token and inline data URL in `body`, in body order
///
/// A placeholder runs to the end of its id characters; a data URL to the
/// end of its base64 payload.
pub fn find_local_references(body: &str) -> Vec<&str> {
    let mut found: Vec<(usize, usize)> = Vec::new();

    for (start, _) in body.match_indices(PLACEHOLDER_SCHEME) {
        let rest = &body[start + PLACEHOLDER_SCHEME.len()..];
        let id_len = run_length(rest, is_id_char);
        if id_len > 0 {
            found.push((start, start + PLACEHOLDER_SCHEME.len() + id_len));
        }
    }

    for (start, _) in body.match_indices(DATA_SCHEME) {
        let rest = &body[start + DATA_SCHEME.len()..];
        let mime_len = run_length(rest, is_mime_char);
        if mime_len == 0 || !rest[mime_len..].starts_with(BASE64_MARKER) {
            continue;
        }
        let payload = &rest[mime_len + BASE64_MARKER.len()..];
        let end = start + DATA_SCHEME.len() + mime_len + BASE64_MARKER.len();
        found.push((start, end + run_length(payload, is_base64_char)));
    }

    found.sort_unstable();
    found.into_iter().map(|(start, end)| &body[start..end]).collect()
}

fn run_length(s: &str, accept: fn(char) -> bool) -> usize {
    s.find(|c: char| !accept(c)).unwrap_or(s.len())
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_mime_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '/' | '+' | '.' | '-')
}

fn is_base64_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')
}

/// A base64 data URL for an encoded image
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InlineReference(String);

impl InlineReference {
    /// Encode image bytes as a data URL
    pub fn encode(image: &EncodedImage) -> Self {
        Self(format!(
            "{}{}{}{}",
            DATA_SCHEME,
            image.mime_type,
            BASE64_MARKER,
            STANDARD.encode(&image.bytes)
        ))
    }

    /// Validate and wrap an existing data URL
    pub fn parse<S: Into<String>>(raw: S) -> BlobResult<Self> {
        let reference = Self(raw.into());
        reference.split()?;
        Ok(reference)
    }

    /// Decode back into the encoded image
    pub fn decode(&self) -> BlobResult<EncodedImage> {
        let (mime_type, payload) = self.split()?;
        let bytes = STANDARD
            .decode(payload)
            .map_err(|e| BlobError::invalid_reference(format!("bad base64 payload: {}", e)))?;
        Ok(EncodedImage::new(bytes, mime_type))
    }

    /// MIME type declared by the reference
    pub fn mime_type(&self) -> BlobResult<&str> {
        self.split().map(|(mime, _)| mime)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split(&self) -> BlobResult<(&str, &str)> {
        let rest = self
            .0
            .strip_prefix(DATA_SCHEME)
            .ok_or_else(|| BlobError::invalid_reference("missing data: scheme"))?;
        let (mime_type, payload) = rest
            .split_once(BASE64_MARKER)
            .ok_or_else(|| BlobError::invalid_reference("missing ;base64, marker"))?;
        if mime_type.is_empty() {
            return Err(BlobError::invalid_reference("empty MIME type"));
        }
        Ok((mime_type, payload))
    }
}

impl fmt::Display for InlineReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for InlineReference {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
