use std::path::Path;

use thiserror::Error;

/// Canonical error type for the archiving pipeline.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// A local or remote path that was expected to exist is missing.
    #[error("`{path}` was not found")]
    NotFound {
        /// Path that could not be found.
        path: String,
    },

    /// The path exists but is not a directory.
    #[error("`{path}` is not a directory")]
    NotADirectory {
        /// Offending path.
        path: String,
    },

    /// Destination already exists and overwriting was not requested.
    #[error("refusing to overwrite existing path `{path}`")]
    FileOverwrite {
        /// Destination that already exists.
        path: String,
    },

    /// Remote transport failed (network, permissions, unavailable store).
    #[error("transport error: {0}")]
    Transport(String),

    /// An archived bucket has no size record.
    #[error("archived bucket `{bucket}` has no size record")]
    MissingSizeRecord {
        /// Bucket identity, `<index>/<name>`.
        bucket: String,
    },

    /// A bucket directory name does not follow the bucket naming scheme.
    #[error("invalid bucket name `{name}`: {reason}")]
    InvalidBucketName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error occurred.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error occurred.
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Validation error for input data.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Unexpected internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable details for debugging purposes.
        message: String,
    },
}

impl ArchiveError {
    /// Creates a `NotFound` variant.
    #[must_use]
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Creates a `NotADirectory` variant.
    #[must_use]
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory { path: path.into() }
    }

    /// Creates a `FileOverwrite` variant.
    #[must_use]
    pub fn file_overwrite(path: impl Into<String>) -> Self {
        Self::FileOverwrite { path: path.into() }
    }

    /// Creates an `Internal` variant.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Wraps an I/O error, turning `ErrorKind::NotFound` into [`ArchiveError::NotFound`]
    /// for the given path.
    #[must_use]
    pub fn from_io(err: std::io::Error, path: &Path) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::not_found(path.display().to_string())
        } else {
            Self::IoError(err)
        }
    }

    /// Whether a later attempt may succeed.
    ///
    /// `FileOverwrite` means the bucket was already archived and retrying cannot
    /// change that; integrity and validation errors are equally permanent.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Transport(_) | Self::IoError(_)
        )
    }
}

impl From<serde_json::Error> for ArchiveError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_eof() || err.is_syntax() {
            Self::DeserializationError(err.to_string())
        } else {
            Self::SerializationError(err.to_string())
        }
    }
}

/// Convenient result alias for archiving operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;
