//! Documents, collections, and payload validation.
//!
//! A document is a JSON object stored as one blob at `<collection>/<id>.json`.
//! The stored object carries its own `id` field. Collections that require
//! values (the default) treat a payload without a non-empty `values` map as
//! an interrupted write: the document exists but is never returned.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::blob::is_valid_segment;

/// File suffix of document blobs.
pub const DOCUMENT_SUFFIX: &str = ".json";

/// Reasons a document is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid document id: {0:?}")]
    InvalidId(String),

    #[error("Invalid collection name: {0:?}")]
    InvalidCollection(String),

    #[error("Payload of {0} is not a JSON object")]
    NotAnObject(String),

    #[error("Payload id {found:?} does not match document id {expected:?}")]
    IdMismatch { expected: String, found: String },

    #[error("Document {0} has no values")]
    MissingValues(String),

    #[error("Document belongs to collection {found:?}, not {expected:?}")]
    CollectionMismatch { expected: String, found: String },
}

/// Validates a document id.
pub fn validate_id(id: &str) -> Result<(), ValidationError> {
    if is_valid_segment(id) {
        Ok(())
    } else {
        Err(ValidationError::InvalidId(id.to_string()))
    }
}

/// Generates a fresh document id.
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// A named namespace of documents sharing a schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Collection {
    name: String,
    require_values: bool,
}

impl Collection {
    /// Creates a collection whose documents must carry a non-empty `values` map.
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if !is_valid_segment(&name) {
            return Err(ValidationError::InvalidCollection(name));
        }
        Ok(Self {
            name,
            require_values: true,
        })
    }

    /// Drops the `values` requirement for this collection.
    pub fn without_values_check(mut self) -> Self {
        self.require_values = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requires_values(&self) -> bool {
        self.require_values
    }

    /// Blob path for a document id.
    pub fn blob_path(&self, id: &str) -> String {
        format!("{}/{}{}", self.name, id, DOCUMENT_SUFFIX)
    }

    /// Derives a document id from a directory entry name.
    ///
    /// Returns `None` for entries that are not document blobs.
    pub fn id_from_entry<'a>(&self, name: &'a str) -> Option<&'a str> {
        name.strip_suffix(DOCUMENT_SUFFIX)
            .filter(|id| is_valid_segment(id))
    }

    /// Checks a payload against this collection's rules.
    pub fn check_payload(&self, id: &str, payload: &Map<String, Value>) -> Result<(), ValidationError> {
        validate_id(id)?;

        match payload.get("id") {
            Some(Value::String(found)) if found == id => {}
            Some(Value::String(found)) => {
                return Err(ValidationError::IdMismatch {
                    expected: id.to_string(),
                    found: found.clone(),
                })
            }
            _ => {
                return Err(ValidationError::IdMismatch {
                    expected: id.to_string(),
                    found: String::new(),
                })
            }
        }

        if self.require_values {
            let has_values = payload
                .get("values")
                .and_then(Value::as_object)
                .is_some_and(|values| !values.is_empty());
            if !has_values {
                return Err(ValidationError::MissingValues(id.to_string()));
            }
        }

        Ok(())
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A JSON document within a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub collection: String,
    pub payload: Map<String, Value>,
    /// Version token from the most recent read or write; `None` if never stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Document {
    /// Creates a new, not yet stored document.
    ///
    /// The payload's `id` field is set to `id`.
    pub fn new(collection: &Collection, id: impl Into<String>, mut payload: Map<String, Value>) -> Self {
        let id = id.into();
        payload.insert("id".to_string(), Value::String(id.clone()));
        Self {
            id,
            collection: collection.name().to_string(),
            payload,
            version: None,
        }
    }

    /// Creates a new document with a generated id.
    pub fn create(collection: &Collection, payload: Map<String, Value>) -> Self {
        Self::new(collection, generate_id(), payload)
    }

    /// Returns true if the document has never been stored.
    pub fn is_new(&self) -> bool {
        self.version.is_none()
    }

    /// The document's `values` map, if present.
    pub fn values(&self) -> Option<&Map<String, Value>> {
        self.payload.get("values").and_then(Value::as_object)
    }
}
