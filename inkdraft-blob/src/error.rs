use thiserror::Error;

/// Result type for local store operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors that can occur while reading or writing the local store
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Invalid store key: {key}")]
    InvalidKey { key: String },

    #[error("Invalid inline reference: {message}")]
    InvalidReference { message: String },

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl BlobError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    /// Create an invalid key error
    pub fn invalid_key<S: Into<String>>(key: S) -> Self {
        Self::InvalidKey { key: key.into() }
    }

    /// Create an invalid inline reference error
    pub fn invalid_reference<S: Into<String>>(message: S) -> Self {
        Self::InvalidReference {
            message: message.into(),
        }
    }
}
