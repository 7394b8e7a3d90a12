//! Collection snapshots and tombstone-first deletion.
//!
//! A fetch is built fresh every time:
//! 1. Read the tombstone set
//! 2. List the collection directory (missing directory = empty collection)
//! 3. Fetch every non-tombstoned member concurrently
//! 4. Drop members that failed to load or failed validation
//!
//! One corrupt or racing document never blocks the rest of the collection.

use std::sync::Arc;

use futures::future;
use futures::stream::{self, StreamExt};

use crate::blob::BlobStore;
use crate::document::{Collection, Document};
use crate::error::{BlobError, StoreError};
use crate::store::DocumentStore;
use crate::tombstone::TombstoneLedger;

/// Default number of member fetches in flight per collection.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Result of deleting a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Whether the underlying blob is confirmed gone. The document is hidden
    /// either way once its tombstone exists.
    pub blob_removed: bool,
}

/// Reachability of the store, as seen at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreStatus {
    /// Reachable and holding documents.
    Ready { documents: usize },
    /// Reachable but empty: first-time setup.
    Empty,
    /// The store rejected our credentials.
    CredentialsRejected,
    /// The store could not be reached or answered unexpectedly.
    Unreachable(String),
}

impl StoreStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, StoreStatus::Ready { .. } | StoreStatus::Empty)
    }
}

impl std::fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreStatus::Ready { documents } => write!(f, "ready ({} documents)", documents),
            StoreStatus::Empty => write!(f, "empty (first-time setup)"),
            StoreStatus::CredentialsRejected => write!(f, "credentials rejected"),
            StoreStatus::Unreachable(reason) => write!(f, "unreachable: {}", reason),
        }
    }
}

/// Reads consistent collection snapshots and sequences deletions.
#[derive(Clone)]
pub struct SyncOrchestrator {
    blobs: Arc<dyn BlobStore>,
    documents: DocumentStore,
    tombstones: TombstoneLedger,
    concurrency: usize,
}

impl SyncOrchestrator {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            documents: DocumentStore::new(blobs.clone()),
            tombstones: TombstoneLedger::new(blobs.clone()),
            blobs,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Sets how many member fetches may run at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Uses a different namespace for deletion markers.
    pub fn with_tombstone_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.tombstones = TombstoneLedger::with_namespace(self.blobs.clone(), namespace);
        self
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn tombstones(&self) -> &TombstoneLedger {
        &self.tombstones
    }

    /// Reads one document unless it has been tombstoned.
    ///
    /// A tombstoned id reads as `None` even when its blob is still present.
    pub async fn read_visible(
        &self,
        collection: &Collection,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        if self.tombstones.tombstone(id).await?.is_some() {
            tracing::debug!("{}/{} is tombstoned", collection, id);
            return Ok(None);
        }
        self.documents.read_one(collection, id).await
    }

    /// Returns every visible document of a collection, in no particular order.
    pub async fn fetch_collection(
        &self,
        collection: &Collection,
    ) -> Result<Vec<Document>, StoreError> {
        let deleted = self.tombstones.list_deleted_ids().await?;
        let entries = self.blobs.list(collection.name()).await?;

        let ids: Vec<String> = entries
            .iter()
            .filter(|e| e.is_file())
            .filter_map(|e| collection.id_from_entry(&e.name))
            .filter(|id| !deleted.contains(*id))
            .map(str::to_string)
            .collect();
        let candidates = ids.len();

        let fetched: Vec<Document> = stream::iter(ids)
            .map(|id| async move {
                match self.documents.read_one(collection, &id).await {
                    Ok(doc) => doc,
                    Err(e) => {
                        tracing::warn!("Skipping {}/{}: {}", collection, id, e);
                        None
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .filter_map(future::ready)
            .collect()
            .await;

        let documents: Vec<Document> = fetched
            .into_iter()
            .filter(|doc| !deleted.contains(&doc.id))
            .collect();

        if documents.len() < candidates {
            tracing::debug!(
                "{}: {} of {} members omitted",
                collection,
                candidates - documents.len(),
                candidates
            );
        }

        Ok(documents)
    }

    /// Deletes a document: tombstone first, then a best-effort blob removal.
    ///
    /// Only a failed tombstone write is an error. Once the tombstone exists
    /// the id never reappears, whatever happens to the blob.
    pub async fn delete_document(
        &self,
        collection: &Collection,
        id: &str,
    ) -> Result<DeleteOutcome, StoreError> {
        self.tombstones.mark_deleted(id).await?;

        let blob_removed = match self.remove_blob(collection, id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    "Tombstoned {}/{} but could not remove its blob: {}",
                    collection,
                    id,
                    e
                );
                false
            }
        };

        Ok(DeleteOutcome { blob_removed })
    }

    async fn remove_blob(&self, collection: &Collection, id: &str) -> Result<(), BlobError> {
        let path = collection.blob_path(id);
        match self.blobs.get(&path).await? {
            Some(blob) => self.blobs.delete(&path, &blob.version).await,
            None => Ok(()),
        }
    }

    /// Probes the store and classifies what the caller should do next.
    pub async fn status(&self, collection: &Collection) -> StoreStatus {
        match self.blobs.probe().await {
            Ok(()) => {}
            Err(BlobError::Unauthorized) => return StoreStatus::CredentialsRejected,
            Err(e) => return StoreStatus::Unreachable(e.to_string()),
        }

        match self.fetch_collection(collection).await {
            Ok(docs) if docs.is_empty() => StoreStatus::Empty,
            Ok(docs) => StoreStatus::Ready {
                documents: docs.len(),
            },
            Err(StoreError::Unauthorized) => StoreStatus::CredentialsRejected,
            Err(e) => StoreStatus::Unreachable(e.to_string()),
        }
    }
}
