//! Compare-and-swap document reads and writes.

use std::sync::Arc;

use serde_json::Value;

use crate::blob::BlobStore;
use crate::document::{validate_id, Collection, Document, ValidationError};
use crate::error::{BlobError, StoreError};

/// Path of the schema/configuration singleton.
pub const CONFIG_DOCUMENT_PATH: &str = "app_config.json";

/// A JSON singleton together with its version token.
#[derive(Debug, Clone, PartialEq)]
pub struct Singleton {
    pub value: Value,
    pub version: String,
}

/// Maps collections onto blob paths and enforces version preconditions.
///
/// There is no retry loop here: a conflicting write surfaces as
/// [`StoreError::WriteConflict`] and the caller decides whether to re-read.
#[derive(Clone)]
pub struct DocumentStore {
    blobs: Arc<dyn BlobStore>,
}

impl DocumentStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Reads one document.
    ///
    /// Returns `Ok(None)` if the blob is missing or its payload fails
    /// validation; a document without values is an interrupted write.
    pub async fn read_one(
        &self,
        collection: &Collection,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        validate_id(id)?;

        let path = collection.blob_path(id);
        let Some(blob) = self.blobs.get(&path).await? else {
            return Ok(None);
        };

        let payload = match serde_json::from_str::<Value>(&blob.content)? {
            Value::Object(map) => map,
            _ => {
                tracing::debug!("Ignoring {}: payload is not an object", path);
                return Ok(None);
            }
        };

        if let Err(e) = collection.check_payload(id, &payload) {
            tracing::debug!("Ignoring {}: {}", path, e);
            return Ok(None);
        }

        Ok(Some(Document {
            id: id.to_string(),
            collection: collection.name().to_string(),
            payload,
            version: Some(blob.version),
        }))
    }

    /// Returns the version token of whatever blob sits at a document's path.
    ///
    /// Unlike [`read_one`](Self::read_one) this does not look at the payload,
    /// so a corrupt or interrupted write still reports its token and can be
    /// overwritten.
    pub async fn stored_version(
        &self,
        collection: &Collection,
        id: &str,
    ) -> Result<Option<String>, StoreError> {
        validate_id(id)?;
        let blob = self.blobs.get(&collection.blob_path(id)).await?;
        Ok(blob.map(|b| b.version))
    }

    /// Writes a document and returns its new version token.
    ///
    /// New documents (no version) are created; existing ones are replaced only
    /// if the stored version still matches `document.version`.
    pub async fn write(
        &self,
        collection: &Collection,
        document: &Document,
    ) -> Result<String, StoreError> {
        if document.collection != collection.name() {
            return Err(ValidationError::CollectionMismatch {
                expected: collection.name().to_string(),
                found: document.collection.clone(),
            }
            .into());
        }
        collection.check_payload(&document.id, &document.payload)?;

        let path = collection.blob_path(&document.id);
        let content = serde_json::to_string_pretty(&document.payload)?;

        match self
            .blobs
            .put(&path, &content, document.version.as_deref())
            .await
        {
            Ok(version) => {
                tracing::debug!("Saved {} at version {}", path, version);
                Ok(version)
            }
            Err(BlobError::Conflict { .. }) => Err(StoreError::WriteConflict {
                collection: collection.name().to_string(),
                id: document.id.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads a JSON singleton such as the configuration document.
    pub async fn read_singleton(&self, path: &str) -> Result<Option<Singleton>, StoreError> {
        let Some(blob) = self.blobs.get(path).await? else {
            return Ok(None);
        };
        Ok(Some(Singleton {
            value: serde_json::from_str(&blob.content)?,
            version: blob.version,
        }))
    }

    /// Writes a JSON singleton under the same version rules as documents.
    pub async fn write_singleton(
        &self,
        path: &str,
        value: &Value,
        version: Option<&str>,
    ) -> Result<String, StoreError> {
        let content = serde_json::to_string_pretty(value)?;
        match self.blobs.put(path, &content, version).await {
            Ok(version) => Ok(version),
            Err(BlobError::Conflict { .. }) => Err(StoreError::WriteConflict {
                collection: String::new(),
                id: path.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}
