//! Test doubles shared by the module tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Barrier, Notify};

use crate::blob::{Blob, BlobEntry, BlobStore, MemoryBlobStore};
use crate::error::BlobError;

/// Wraps a [`MemoryBlobStore`] and fails selected operations.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryBlobStore,
    failing_gets: Mutex<HashSet<String>>,
    fail_deletes: Mutex<bool>,
    fail_puts: Mutex<bool>,
    reject_credentials: Mutex<bool>,
    /// When set, deletes wait for a notification before proceeding.
    pub delete_gate: Mutex<Option<Arc<Notify>>>,
    /// When set, gets wait at the barrier before proceeding.
    get_barrier: Mutex<Option<Arc<Barrier>>>,
    pub gets: AtomicUsize,
    in_flight_gets: AtomicUsize,
    /// Highest number of gets seen in flight at once.
    pub peak_gets: AtomicUsize,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_get(&self, path: &str) {
        self.failing_gets.lock().insert(path.to_string());
    }

    /// Makes every get wait until `parties` gets are in flight together.
    pub fn gate_gets(&self, parties: usize) {
        *self.get_barrier.lock() = Some(Arc::new(Barrier::new(parties)));
    }

    pub fn fail_deletes(&self) {
        *self.fail_deletes.lock() = true;
    }

    pub fn fail_puts(&self) {
        *self.fail_puts.lock() = true;
    }

    pub fn reject_credentials(&self) {
        *self.reject_credentials.lock() = true;
    }

    fn check_auth(&self) -> Result<(), BlobError> {
        if *self.reject_credentials.lock() {
            Err(BlobError::Unauthorized)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BlobStore for FaultyStore {
    async fn get(&self, path: &str) -> Result<Option<Blob>, BlobError> {
        self.check_auth()?;
        self.gets.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.in_flight_gets.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_gets.fetch_max(in_flight, Ordering::SeqCst);

        let barrier = self.get_barrier.lock().clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }

        let result = if self.failing_gets.lock().contains(path) {
            Err(BlobError::Transport("connection reset".to_string()))
        } else {
            self.inner.get(path).await
        };
        self.in_flight_gets.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn put(
        &self,
        path: &str,
        content: &str,
        version: Option<&str>,
    ) -> Result<String, BlobError> {
        self.check_auth()?;
        if *self.fail_puts.lock() {
            return Err(BlobError::Remote {
                status: 502,
                message: "bad gateway".to_string(),
            });
        }
        self.inner.put(path, content, version).await
    }

    async fn delete(&self, path: &str, version: &str) -> Result<(), BlobError> {
        self.check_auth()?;
        let gate = self.delete_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if *self.fail_deletes.lock() {
            return Err(BlobError::Transport("timed out".to_string()));
        }
        self.inner.delete(path, version).await
    }

    async fn list(&self, dir: &str) -> Result<Vec<BlobEntry>, BlobError> {
        self.check_auth()?;
        self.inner.list(dir).await
    }

    async fn probe(&self) -> Result<(), BlobError> {
        self.check_auth()
    }
}
