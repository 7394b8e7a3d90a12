//! Error types for blob and document operations.

use thiserror::Error;

use crate::codec::CodecError;
use crate::document::ValidationError;

/// Errors returned by a [`BlobStore`](crate::blob::BlobStore).
///
/// A missing blob is not an error; reads return `Ok(None)` instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlobError {
    /// The store rejected the credentials. Requires reconfiguration.
    #[error("Credentials rejected by the blob store")]
    Unauthorized,

    /// The version token did not match, or the target already exists.
    #[error("Version conflict at {path}")]
    Conflict { path: String },

    /// Any other unexpected status from the store.
    #[error("Blob store returned {status}: {message}")]
    Remote { status: u16, message: String },

    /// The request never produced a response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The store answered with a body we could not understand.
    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors returned by the document layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The document changed since it was read. Re-read and retry, or abandon.
    #[error("Write conflict on {collection}/{id}: the document changed since it was read")]
    WriteConflict { collection: String, id: String },

    #[error("Credentials rejected by the blob store")]
    Unauthorized,

    #[error("Blob store returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid document: {0}")]
    Validation(#[from] ValidationError),

    #[error("Corrupt blob: {0}")]
    Codec(#[from] CodecError),

    #[error("Corrupt document JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true for errors that need reconfiguration rather than a retry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Unauthorized)
    }

    /// Returns true if the caller should re-read and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::WriteConflict { .. })
    }
}

impl From<BlobError> for StoreError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::Unauthorized => StoreError::Unauthorized,
            BlobError::Conflict { path } => StoreError::Remote {
                status: 409,
                message: format!("Version conflict at {}", path),
            },
            BlobError::Remote { status, message } => StoreError::Remote { status, message },
            BlobError::Transport(e) => StoreError::Transport(e),
            BlobError::Malformed(e) => StoreError::Transport(format!("malformed response: {}", e)),
            BlobError::Codec(e) => StoreError::Codec(e),
        }
    }
}
