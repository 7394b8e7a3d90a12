//! Versioned blob store abstraction.
//!
//! A blob store exposes four primitives over slash-separated paths:
//! get, put, delete, and list. Every stored blob carries an opaque version
//! token that callers present back as a compare-and-swap precondition.
//!
//! Two implementations are provided:
//! - [`HttpBlobClient`]: talks to a remote store over HTTP
//! - [`MemoryBlobStore`]: in-process store with the same semantics

mod http;
mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use http::HttpBlobClient;
pub use memory::MemoryBlobStore;

use crate::error::BlobError;

/// Content and version of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub content: String,
    pub version: String,
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl BlobEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Dir,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// The primitives of a versioned blob store.
///
/// Implementations must observe the most recent committed state on every
/// call; a stale read here resurrects deleted documents.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetches a blob. Returns `Ok(None)` if nothing is stored at `path`.
    async fn get(&self, path: &str) -> Result<Option<Blob>, BlobError>;

    /// Stores a blob and returns its new version token.
    ///
    /// With `version`, the write only succeeds if the stored token matches.
    /// Without it, the write only succeeds if nothing is stored at `path`.
    async fn put(&self, path: &str, content: &str, version: Option<&str>)
        -> Result<String, BlobError>;

    /// Removes a blob if its stored token matches `version`.
    ///
    /// Removing a blob that does not exist succeeds.
    async fn delete(&self, path: &str, version: &str) -> Result<(), BlobError>;

    /// Lists a directory. A directory that was never created lists as empty.
    async fn list(&self, dir: &str) -> Result<Vec<BlobEntry>, BlobError>;

    /// Checks that the store is reachable and accepts our credentials.
    async fn probe(&self) -> Result<(), BlobError>;
}

/// Computes the version token for blob content.
///
/// Tokens are content-addressed the way git blob ids are, so rewriting
/// identical content yields the same token.
pub fn version_token(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("blob {}\0", content.len()).as_bytes());
    hasher.update(content.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Returns true if `segment` is usable as a single path component.
///
/// Rejects empty names, separators, parent references, and hidden names.
pub fn is_valid_segment(segment: &str) -> bool {
    !(segment.is_empty()
        || segment.contains('/')
        || segment.contains('\\')
        || segment.contains("..")
        || segment.starts_with('.'))
}

/// Splits a store path into its segments, rejecting anything unsafe.
pub fn split_path(path: &str) -> Option<Vec<&str>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Some(Vec::new());
    }
    let segments: Vec<&str> = trimmed.split('/').collect();
    if segments.iter().all(|s| is_valid_segment(s)) {
        Some(segments)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_token_is_stable() {
        assert_eq!(version_token("abc"), version_token("abc"));
        assert_ne!(version_token("abc"), version_token("abd"));
        assert_eq!(version_token("abc").len(), 64);
    }

    #[test]
    fn test_version_token_matches_git_blob_id_scheme() {
        // sha256 of "blob 0\0"
        assert_eq!(
            version_token(""),
            "473a0f4c3be8a93681a267e3b1e9a7dcda1185436fe141f7749120a303721813"
        );
    }

    #[test]
    fn test_is_valid_segment() {
        assert!(is_valid_segment("p1.json"));
        assert!(is_valid_segment("ผู้ป่วย"));
        assert!(!is_valid_segment(""));
        assert!(!is_valid_segment("a/b"));
        assert!(!is_valid_segment("a\\b"));
        assert!(!is_valid_segment(".."));
        assert!(!is_valid_segment(".hidden"));
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("patients/p1.json"), Some(vec!["patients", "p1.json"]));
        assert_eq!(split_path("/patients/"), Some(vec!["patients"]));
        assert_eq!(split_path(""), Some(vec![]));
        assert_eq!(split_path("patients/../secret"), None);
        assert_eq!(split_path("patients//p1"), None);
    }
}
