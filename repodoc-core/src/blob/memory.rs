//! In-process blob store.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{split_path, version_token, Blob, BlobEntry, BlobStore};
use crate::error::BlobError;

/// A [`BlobStore`] kept in memory.
///
/// Enforces the same version-token preconditions as the HTTP store, which
/// makes it a drop-in backend for tests and single-process embedders.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    /// Returns true if a blob exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.blobs.read().contains_key(path.trim_matches('/'))
    }

    fn normalize(path: &str) -> Result<String, BlobError> {
        match split_path(path) {
            Some(segments) if !segments.is_empty() => Ok(segments.join("/")),
            _ => Err(BlobError::Remote {
                status: 400,
                message: format!("Invalid path: {}", path),
            }),
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, path: &str) -> Result<Option<Blob>, BlobError> {
        let key = Self::normalize(path)?;
        let blobs = self.blobs.read();
        Ok(blobs.get(&key).map(|content| Blob {
            content: content.clone(),
            version: version_token(content),
        }))
    }

    async fn put(
        &self,
        path: &str,
        content: &str,
        version: Option<&str>,
    ) -> Result<String, BlobError> {
        let key = Self::normalize(path)?;
        let mut blobs = self.blobs.write();

        let current = blobs.get(&key).map(|c| version_token(c));
        match (current.as_deref(), version) {
            (None, None) => {}
            (Some(stored), Some(expected)) if stored == expected => {}
            _ => return Err(BlobError::Conflict { path: key }),
        }

        blobs.insert(key, content.to_string());
        Ok(version_token(content))
    }

    async fn delete(&self, path: &str, version: &str) -> Result<(), BlobError> {
        let key = Self::normalize(path)?;
        let mut blobs = self.blobs.write();

        match blobs.get(&key) {
            None => Ok(()),
            Some(content) if version_token(content) == version => {
                blobs.remove(&key);
                Ok(())
            }
            Some(_) => Err(BlobError::Conflict { path: key }),
        }
    }

    async fn list(&self, dir: &str) -> Result<Vec<BlobEntry>, BlobError> {
        let segments = split_path(dir).ok_or_else(|| BlobError::Remote {
            status: 400,
            message: format!("Invalid path: {}", dir),
        })?;
        let prefix = if segments.is_empty() {
            String::new()
        } else {
            format!("{}/", segments.join("/"))
        };

        let blobs = self.blobs.read();
        let mut files = BTreeSet::new();
        let mut dirs = BTreeSet::new();

        for key in blobs.keys() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((child_dir, _)) => {
                    dirs.insert(child_dir.to_string());
                }
                None => {
                    files.insert(rest.to_string());
                }
            }
        }

        Ok(dirs
            .into_iter()
            .map(BlobEntry::dir)
            .chain(files.into_iter().map(BlobEntry::file))
            .collect())
    }

    async fn probe(&self) -> Result<(), BlobError> {
        Ok(())
    }
}
