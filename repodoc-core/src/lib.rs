//! Repodoc Core Library
//!
//! Document storage on top of a versioned blob store: compare-and-swap
//! writes, tombstone-based deletes, and tolerant collection listings.

pub mod blob;
pub mod codec;
pub mod document;
pub mod error;
pub mod gate;
pub mod models;
pub mod reconcile;
pub mod store;
pub mod sync;
pub mod tombstone;

#[cfg(test)]
mod testing;

pub use blob::{version_token, Blob, BlobEntry, BlobStore, EntryKind, HttpBlobClient, MemoryBlobStore};
pub use codec::CodecError;
pub use document::{generate_id, validate_id, Collection, Document, ValidationError};
pub use error::{BlobError, StoreError};
pub use gate::{GateError, WriteGate, WriteGuard};
pub use models::Record;
pub use reconcile::{CacheError, PendingDeletions, ReconcilingClient};
pub use store::{DocumentStore, Singleton, CONFIG_DOCUMENT_PATH};
pub use sync::{DeleteOutcome, StoreStatus, SyncOrchestrator};
pub use tombstone::{Tombstone, TombstoneLedger};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
