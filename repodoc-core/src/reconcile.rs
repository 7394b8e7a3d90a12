//! Client-side reconciliation: optimistic deletes and a pending-deletion set.
//!
//! Deleting through [`ReconcilingClient::delete`] hides the id immediately,
//! before any network call is made, and records it in a locally persisted
//! pending-deletion set. Every refresh subtracts that set from the server
//! snapshot, which masks tombstones that are not yet visible to listings.
//!
//! The pending set is sticky for the session: entries are only removed by an
//! explicit [`ReconcilingClient::clear_pending`].

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::document::{Collection, Document};
use crate::error::StoreError;
use crate::sync::{DeleteOutcome, SyncOrchestrator};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("I/O error for {0}: {1}")]
    Io(PathBuf, #[source] io::Error),

    #[error("Failed to encode pending deletions: {0}")]
    Json(#[from] serde_json::Error),
}

/// Locally persisted set of ids the user has deleted.
///
/// Stored as a JSON array in a single file, read once at startup and
/// rewritten whenever an id is added.
#[derive(Debug, Default)]
pub struct PendingDeletions {
    path: Option<PathBuf>,
    ids: BTreeSet<String>,
}

impl PendingDeletions {
    /// A set that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the set from `path`.
    ///
    /// A missing file is an empty set. An unreadable or corrupt file is
    /// logged and also treated as empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ids = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<BTreeSet<String>>(&contents) {
                Ok(ids) => ids,
                Err(e) => {
                    tracing::warn!(
                        "Ignoring corrupt pending deletions file {}: {}",
                        path.display(),
                        e
                    );
                    BTreeSet::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => {
                tracing::warn!(
                    "Failed to read pending deletions {}: {}",
                    path.display(),
                    e
                );
                BTreeSet::new()
            }
        };

        Self {
            path: Some(path),
            ids,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Adds an id and persists the set.
    ///
    /// The in-memory set is updated even if persisting fails.
    pub fn insert(&mut self, id: &str) -> Result<(), CacheError> {
        if self.ids.insert(id.to_string()) {
            self.persist()?;
        }
        Ok(())
    }

    /// Empties the set, on disk too.
    pub fn clear(&mut self) -> Result<(), CacheError> {
        self.ids.clear();
        self.persist()
    }

    /// Removes every pending id from `documents`.
    pub fn retain_visible(&self, mut documents: Vec<Document>) -> Vec<Document> {
        documents.retain(|doc| !self.ids.contains(&doc.id));
        documents
    }

    fn persist(&self) -> Result<(), CacheError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheError::Io(parent.to_path_buf(), e))?;
        }

        let contents = serde_json::to_string(&self.ids)?;

        // Write atomically using temp file + rename
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, contents).map_err(|e| CacheError::Io(temp_path.clone(), e))?;
        fs::rename(&temp_path, path).map_err(|e| CacheError::Io(path.clone(), e))?;

        Ok(())
    }
}

/// Wraps a [`SyncOrchestrator`] with an optimistic in-memory working set.
#[derive(Clone)]
pub struct ReconcilingClient {
    sync: Arc<SyncOrchestrator>,
    // Lock order: pending before working.
    pending: Arc<Mutex<PendingDeletions>>,
    working: Arc<Mutex<HashMap<String, Vec<Document>>>>,
}

impl ReconcilingClient {
    pub fn new(sync: SyncOrchestrator, pending: PendingDeletions) -> Self {
        Self {
            sync: Arc::new(sync),
            pending: Arc::new(Mutex::new(pending)),
            working: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn sync(&self) -> &SyncOrchestrator {
        &self.sync
    }

    /// Fetches a collection, hides pending deletions, and replaces the
    /// working set with the result.
    pub async fn refresh(&self, collection: &Collection) -> Result<Vec<Document>, StoreError> {
        let fetched = self.sync.fetch_collection(collection).await?;

        let pending = self.pending.lock();
        let visible = pending.retain_visible(fetched);
        self.working
            .lock()
            .insert(collection.name().to_string(), visible.clone());

        Ok(visible)
    }

    /// The documents currently shown for a collection.
    pub fn working_set(&self, collection: &Collection) -> Vec<Document> {
        self.working
            .lock()
            .get(collection.name())
            .cloned()
            .unwrap_or_default()
    }

    /// Deletes a document optimistically.
    ///
    /// Before this returns, the id is recorded as pending and removed from
    /// the working set. The returned future performs the remote deletion and
    /// can be awaited or spawned; its failure leaves the id hidden.
    pub fn delete(
        &self,
        collection: &Collection,
        id: &str,
    ) -> impl Future<Output = Result<DeleteOutcome, StoreError>> + Send + 'static {
        self.hide(collection, id);

        let sync = self.sync.clone();
        let collection = collection.clone();
        let id = id.to_string();

        async move {
            let result = sync.delete_document(&collection, &id).await;
            if let Err(e) = &result {
                tracing::warn!(
                    "Remote delete of {}/{} failed, keeping it hidden locally: {}",
                    collection,
                    id,
                    e
                );
            }
            result
        }
    }

    fn hide(&self, collection: &Collection, id: &str) {
        let mut pending = self.pending.lock();
        if let Err(e) = pending.insert(id) {
            tracing::error!("Failed to save pending deletion {}: {}", id, e);
        }

        if let Some(docs) = self.working.lock().get_mut(collection.name()) {
            docs.retain(|doc| doc.id != id);
        }
    }

    /// Writes a document and updates its working-set entry.
    ///
    /// Returns the document carrying its new version token.
    pub async fn save(
        &self,
        collection: &Collection,
        document: &Document,
    ) -> Result<Document, StoreError> {
        let version = self.sync.documents().write(collection, document).await?;
        let mut saved = document.clone();
        saved.version = Some(version);

        let pending = self.pending.lock();
        if !pending.contains(&saved.id) {
            let mut working = self.working.lock();
            let docs = working.entry(collection.name().to_string()).or_default();
            match docs.iter_mut().find(|doc| doc.id == saved.id) {
                Some(slot) => *slot = saved.clone(),
                None => docs.push(saved.clone()),
            }
        }

        Ok(saved)
    }

    /// Returns true if `id` is hidden by the pending-deletion set.
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.lock().contains(id)
    }

    /// Snapshot of the pending-deletion set.
    pub fn pending(&self) -> Vec<String> {
        self.pending.lock().ids().map(str::to_string).collect()
    }

    /// Explicit cache reset: un-hides every pending id on the next refresh.
    pub fn clear_pending(&self) -> Result<(), CacheError> {
        self.pending.lock().clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{BlobStore, MemoryBlobStore};
    use crate::models::Record;
    use crate::testing::FaultyStore;
    use tempfile::TempDir;

    fn patients() -> Collection {
        Collection::new("patients").unwrap()
    }

    fn record(id: &str) -> Document {
        Record::new("patients")
            .with_id(id)
            .with_value("name", format!("patient {}", id))
            .into_document(&patients())
            .unwrap()
    }

    fn ids(docs: &[Document]) -> Vec<String> {
        let mut ids: Vec<String> = docs.iter().map(|d| d.id.clone()).collect();
        ids.sort();
        ids
    }

    async fn seed(store: Arc<dyn BlobStore>) -> SyncOrchestrator {
        let sync = SyncOrchestrator::new(store);
        for id in ["p1", "p2", "p3"] {
            sync.documents().write(&patients(), &record(id)).await.unwrap();
        }
        sync
    }

    #[test]
    fn test_pending_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let pending = PendingDeletions::load(temp_dir.path().join("pending.json"));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_pending_persists_across_loads() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state").join("pending.json");

        let mut pending = PendingDeletions::load(&path);
        pending.insert("p1").unwrap();
        pending.insert("p2").unwrap();
        pending.insert("p1").unwrap();

        let reloaded = PendingDeletions::load(&path);
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("p1"));
        assert!(reloaded.contains("p2"));

        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw, r#"["p1","p2"]"#);
    }

    #[test]
    fn test_pending_corrupt_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pending.json");
        fs::write(&path, "{oops").unwrap();

        let pending = PendingDeletions::load(&path);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_pending_clear() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pending.json");
        let mut pending = PendingDeletions::load(&path);
        pending.insert("p1").unwrap();
        pending.clear().unwrap();

        assert!(PendingDeletions::load(&path).is_empty());
    }

    #[tokio::test]
    async fn test_delete_hides_before_network() {
        let store = Arc::new(FaultyStore::new());
        let sync = seed(store.clone()).await;
        let client = ReconcilingClient::new(sync, PendingDeletions::in_memory());
        assert_eq!(client.refresh(&patients()).await.unwrap().len(), 3);

        let remote = client.delete(&patients(), "p1");

        // Not polled yet: nothing has reached the store
        assert_eq!(ids(&client.working_set(&patients())), vec!["p2", "p3"]);
        assert!(client.is_pending("p1"));
        assert!(store.inner.contains("patients/p1.json"));

        // A refresh that races ahead of the remote delete still hides p1
        let refreshed = client.refresh(&patients()).await.unwrap();
        assert_eq!(ids(&refreshed), vec!["p2", "p3"]);

        let outcome = remote.await.unwrap();
        assert!(outcome.blob_removed);
        assert!(!store.inner.contains("patients/p1.json"));
    }

    #[tokio::test]
    async fn test_delete_while_remote_call_in_flight() {
        let store = Arc::new(FaultyStore::new());
        let sync = seed(store.clone()).await;
        let client = ReconcilingClient::new(sync, PendingDeletions::in_memory());
        client.refresh(&patients()).await.unwrap();

        let gate = Arc::new(tokio::sync::Notify::new());
        *store.delete_gate.lock() = Some(gate.clone());

        let handle = tokio::spawn(client.delete(&patients(), "p2"));
        tokio::task::yield_now().await;

        assert_eq!(ids(&client.working_set(&patients())), vec!["p1", "p3"]);
        assert_eq!(ids(&client.refresh(&patients()).await.unwrap()), vec!["p1", "p3"]);

        gate.notify_one();
        handle.await.unwrap().unwrap();
        assert_eq!(ids(&client.refresh(&patients()).await.unwrap()), vec!["p1", "p3"]);
    }

    #[tokio::test]
    async fn test_failed_remote_delete_stays_hidden() {
        let store = Arc::new(FaultyStore::new());
        let sync = seed(store.clone()).await;
        let client = ReconcilingClient::new(sync, PendingDeletions::in_memory());
        client.refresh(&patients()).await.unwrap();

        store.fail_puts();
        let result = client.delete(&patients(), "p1").await;
        assert!(result.is_err());

        // No rollback
        assert_eq!(ids(&client.working_set(&patients())), vec!["p2", "p3"]);
        assert_eq!(ids(&client.refresh(&patients()).await.unwrap()), vec!["p2", "p3"]);
        assert!(store.inner.contains("patients/p1.json"));
    }

    #[tokio::test]
    async fn test_pending_set_is_sticky_after_success() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let sync = seed(store).await;
        let client = ReconcilingClient::new(sync, PendingDeletions::in_memory());

        client.delete(&patients(), "p1").await.unwrap();
        client.refresh(&patients()).await.unwrap();

        assert_eq!(client.pending(), vec!["p1".to_string()]);
    }

    #[tokio::test]
    async fn test_clear_pending_unhides_undeleted_document() {
        let store = Arc::new(FaultyStore::new());
        let sync = seed(store.clone()).await;
        let client = ReconcilingClient::new(sync, PendingDeletions::in_memory());

        store.fail_puts();
        let _ = client.delete(&patients(), "p1").await;
        assert_eq!(client.refresh(&patients()).await.unwrap().len(), 2);

        client.clear_pending().unwrap();
        assert_eq!(client.refresh(&patients()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_pending_deletions_survive_restart() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pending.json");
        let store = Arc::new(FaultyStore::new());
        store.fail_puts();

        {
            let sync = seed_with_puts(store.clone()).await;
            let client = ReconcilingClient::new(sync, PendingDeletions::load(&path));
            let _ = client.delete(&patients(), "p3").await;
        }

        let client = ReconcilingClient::new(
            SyncOrchestrator::new(store.clone()),
            PendingDeletions::load(&path),
        );
        assert_eq!(ids(&client.refresh(&patients()).await.unwrap()), vec!["p1", "p2"]);
    }

    async fn seed_with_puts(store: Arc<FaultyStore>) -> SyncOrchestrator {
        for id in ["p1", "p2", "p3"] {
            let doc = record(id);
            let content = serde_json::to_string(&doc.payload).unwrap();
            store
                .inner
                .put(&patients().blob_path(id), &content, None)
                .await
                .unwrap();
        }
        SyncOrchestrator::new(store)
    }

    #[tokio::test]
    async fn test_save_updates_working_set() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let sync = seed(store).await;
        let client = ReconcilingClient::new(sync, PendingDeletions::in_memory());
        let docs = client.refresh(&patients()).await.unwrap();

        let mut p1 = docs.into_iter().find(|d| d.id == "p1").unwrap();
        let old_version = p1.version.clone();
        p1.payload["values"]["name"] = serde_json::json!("Somchai");

        let saved = client.save(&patients(), &p1).await.unwrap();
        assert_ne!(saved.version, old_version);

        let working = client.working_set(&patients());
        let entry = working.iter().find(|d| d.id == "p1").unwrap();
        assert_eq!(entry.version, saved.version);
        assert_eq!(entry.values().unwrap()["name"], "Somchai");

        // Stale copy now conflicts
        let err = client.save(&patients(), &p1).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_save_new_document_appends() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let client = ReconcilingClient::new(SyncOrchestrator::new(store), PendingDeletions::in_memory());

        let saved = client.save(&patients(), &record("p9")).await.unwrap();
        assert!(saved.version.is_some());
        assert_eq!(ids(&client.working_set(&patients())), vec!["p9"]);
    }
}
