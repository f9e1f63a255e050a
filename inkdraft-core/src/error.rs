use std::fmt;

use inkdraft_blob::BlobError;
use thiserror::Error;

/// Internal compressor failure; never surfaced past the staging step
#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Unsupported image: {message}")]
    Decode { message: String },

    #[error("Encoding failed: {message}")]
    Encode { message: String },

    #[error("Compression worker failed: {message}")]
    Worker { message: String },
}

impl CompressionError {
    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn encode<S: Into<String>>(message: S) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }
}

/// One file that could not be staged; the rest of its batch carries on
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to stage {file_name}: {reason}")]
pub struct StagingFailure {
    pub file_name: String,
    pub reason: String,
}

impl StagingFailure {
    pub fn new<N: Into<String>, R: Into<String>>(file_name: N, reason: R) -> Self {
        Self {
            file_name: file_name.into(),
            reason: reason.into(),
        }
    }
}

/// Errors returned by a remote upload collaborator
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Upload rejected: {message}")]
    Rejected { message: String },

    #[error("Upload returned {returned} descriptors for {submitted} files")]
    CountMismatch { submitted: usize, returned: usize },

    #[error("Upload transport error: {source}")]
    Transport {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl UploadError {
    pub fn rejected<S: Into<String>>(message: S) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    pub fn transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            source: Box::new(error),
        }
    }
}

/// A failed upload batch; aborts the whole reconciliation
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Failed to upload cover image: {source}")]
    CoverUpload {
        #[source]
        source: UploadError,
    },

    #[error("Failed to upload content images: {source}")]
    ContentUpload {
        #[source]
        source: UploadError,
    },
}

/// Errors returned by a remote document collaborator
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Document not found: {id}")]
    NotFound { id: String },

    #[error("Document rejected: {message}")]
    Rejected { message: String },

    #[error("Document transport error: {source}")]
    Transport {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl DocumentError {
    pub fn not_found<S: Into<String>>(id: S) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn rejected<S: Into<String>>(message: S) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    pub fn transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            source: Box::new(error),
        }
    }
}

/// Phase of a save that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePhase {
    Guard,
    Validation,
    CoverUpload,
    ContentUpload,
    Submission,
}

impl fmt::Display for SavePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SavePhase::Guard => write!(f, "guard"),
            SavePhase::Validation => write!(f, "validation"),
            SavePhase::CoverUpload => write!(f, "cover_upload"),
            SavePhase::ContentUpload => write!(f, "content_upload"),
            SavePhase::Submission => write!(f, "submission"),
        }
    }
}

/// A save that did not reach the remote document store
///
/// Whatever the variant, local staged images and the draft are left intact.
#[derive(Error, Debug)]
pub enum SaveError {
    #[error("A save is already in progress")]
    InFlight,

    /// The body embeds local references to images that are not staged
    #[error("Body references {count} images that are not staged")]
    UnresolvedReferences { count: usize },

    #[error("Failed to upload cover image: {source}")]
    CoverUpload {
        #[source]
        source: UploadError,
    },

    #[error("Failed to upload content images: {source}")]
    ContentUpload {
        #[source]
        source: UploadError,
    },

    #[error("Failed to submit document: {source}")]
    Submission {
        #[source]
        source: DocumentError,
    },
}

impl SaveError {
    pub fn phase(&self) -> SavePhase {
        match self {
            SaveError::InFlight => SavePhase::Guard,
            SaveError::UnresolvedReferences { .. } => SavePhase::Validation,
            SaveError::CoverUpload { .. } => SavePhase::CoverUpload,
            SaveError::ContentUpload { .. } => SavePhase::ContentUpload,
            SaveError::Submission { .. } => SavePhase::Submission,
        }
    }

    /// One human-readable line naming the phase that failed
    pub fn user_message(&self) -> &'static str {
        match self {
            SaveError::InFlight => "A save is already in progress",
            SaveError::UnresolvedReferences { .. } => {
                "Some images in the document are no longer available"
            }
            SaveError::CoverUpload { .. } => "Failed to upload cover image",
            SaveError::ContentUpload { .. } => "Failed to upload content images",
            SaveError::Submission { .. } => "Failed to save the document",
        }
    }
}

impl From<ReconcileError> for SaveError {
    fn from(error: ReconcileError) -> Self {
        match error {
            ReconcileError::CoverUpload { source } => SaveError::CoverUpload { source },
            ReconcileError::ContentUpload { source } => SaveError::ContentUpload { source },
        }
    }
}

/// Errors from session operations other than save
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Local store error: {source}")]
    Store {
        #[from]
        source: BlobError,
    },

    #[error("Document error: {source}")]
    Document {
        #[from]
        source: DocumentError,
    },

    #[error(transparent)]
    Staging(#[from] StagingFailure),

    #[error("Unknown image: {id}")]
    UnknownImage { id: String },
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
