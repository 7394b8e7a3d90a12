//! Deletion markers.
//!
//! Every deleted id gets its own marker blob, named after the id, under a
//! reserved namespace:
//! ```text
//! deleted_log/
//!   p1
//!   p7
//! ```
//! Markers are never removed. Because each id owns a separate path, deletes
//! by different writers never contend on a shared list.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::blob::BlobStore;
use crate::document::validate_id;
use crate::error::{BlobError, StoreError};

/// Default namespace for deletion markers.
pub const DEFAULT_NAMESPACE: &str = "deleted_log";

/// A persistent record that an id was deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    pub id: String,
    pub deleted_at: DateTime<Utc>,
}

impl Tombstone {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            deleted_at: Utc::now(),
        }
    }
}

/// Directory-backed set of deleted ids.
#[derive(Clone)]
pub struct TombstoneLedger {
    blobs: Arc<dyn BlobStore>,
    namespace: String,
}

impl TombstoneLedger {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self::with_namespace(blobs, DEFAULT_NAMESPACE)
    }

    pub fn with_namespace(blobs: Arc<dyn BlobStore>, namespace: impl Into<String>) -> Self {
        Self {
            blobs,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn marker_path(&self, id: &str) -> String {
        format!("{}/{}", self.namespace, id)
    }

    /// Records that `id` is deleted.
    ///
    /// Safe to repeat: an existing marker is overwritten with a fresh
    /// timestamp. Losing a race against another writer marking the same id
    /// still leaves a marker in place, so a conflict counts as success.
    pub async fn mark_deleted(&self, id: &str) -> Result<(), StoreError> {
        validate_id(id)?;

        let path = self.marker_path(id);
        let existing = self.blobs.get(&path).await?;
        let content = serde_json::to_string_pretty(&Tombstone::new(id))?;

        match self
            .blobs
            .put(&path, &content, existing.as_ref().map(|b| b.version.as_str()))
            .await
        {
            Ok(_) => {
                tracing::debug!("Marked {} deleted", id);
                Ok(())
            }
            Err(BlobError::Conflict { .. }) => {
                tracing::debug!("Marker for {} written concurrently", id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns every deleted id.
    ///
    /// A namespace that was never created means nothing was deleted. Any
    /// other failure is returned: an incomplete set would let deleted
    /// documents reappear.
    pub async fn list_deleted_ids(&self) -> Result<HashSet<String>, StoreError> {
        let entries = self.blobs.list(&self.namespace).await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.is_file())
            .map(|e| e.name)
            .collect())
    }

    /// Reads the marker for `id`, if any.
    pub async fn tombstone(&self, id: &str) -> Result<Option<Tombstone>, StoreError> {
        validate_id(id)?;
        match self.blobs.get(&self.marker_path(id)).await? {
            Some(blob) => Ok(Some(serde_json::from_str(&blob.content)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;

    fn setup() -> (TombstoneLedger, Arc<MemoryBlobStore>) {
        let blobs = Arc::new(MemoryBlobStore::new());
        (TombstoneLedger::new(blobs.clone()), blobs)
    }

    #[tokio::test]
    async fn test_empty_namespace_lists_nothing() {
        let (ledger, _blobs) = setup();
        assert!(ledger.list_deleted_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_and_list() {
        let (ledger, blobs) = setup();
        ledger.mark_deleted("p1").await.unwrap();
        ledger.mark_deleted("p2").await.unwrap();

        let ids = ledger.list_deleted_ids().await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("p1"));
        assert!(ids.contains("p2"));
        assert!(blobs.contains("deleted_log/p1"));
    }

    #[tokio::test]
    async fn test_mark_deleted_is_idempotent() {
        let (ledger, blobs) = setup();
        ledger.mark_deleted("p1").await.unwrap();
        let first = ledger.tombstone("p1").await.unwrap().unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        ledger.mark_deleted("p1").await.unwrap();
        let second = ledger.tombstone("p1").await.unwrap().unwrap();

        assert_eq!(blobs.list("deleted_log").await.unwrap().len(), 1);
        assert_eq!(ledger.list_deleted_ids().await.unwrap().len(), 1);
        assert!(second.deleted_at >= first.deleted_at);
    }

    #[tokio::test]
    async fn test_tombstone_wire_format() {
        let (ledger, blobs) = setup();
        ledger.mark_deleted("p1").await.unwrap();

        let blob = blobs.get("deleted_log/p1").await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&blob.content).unwrap();
        assert_eq!(value["id"], "p1");
        assert!(value["deletedAt"].is_string());
    }

    #[tokio::test]
    async fn test_custom_namespace() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let ledger = TombstoneLedger::with_namespace(blobs.clone(), "trash");
        ledger.mark_deleted("p1").await.unwrap();

        assert!(blobs.contains("trash/p1"));
        assert_eq!(ledger.namespace(), "trash");
    }

    #[tokio::test]
    async fn test_invalid_id_rejected() {
        let (ledger, _blobs) = setup();
        assert!(ledger.mark_deleted("a/b").await.is_err());
    }
}
