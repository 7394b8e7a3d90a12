use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::document::{generate_id, Collection, Document};

/// A form record: the typed shape of a patient-like document payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub model_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub values: Map<String, Value>,
}

impl Record {
    pub fn new(model_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            model_id: model_id.into(),
            created_at: now,
            updated_at: now,
            values: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_value(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// Sets a field and bumps `updated_at`.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(field.into(), value.into());
        self.updated_at = Utc::now();
    }

    /// Converts to a document that has not been stored yet.
    pub fn into_document(self, collection: &Collection) -> Result<Document, serde_json::Error> {
        let id = self.id.clone();
        let payload = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Ok(Document::new(collection, id, payload))
    }

    /// Reads a record back out of a document payload.
    pub fn from_document(document: &Document) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(document.payload.clone()))
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Record: {} ({})", self.id, self.model_id)?;
        writeln!(f, "{}", "=".repeat(30))?;

        for (field, value) in &self.values {
            match value {
                Value::String(s) => writeln!(f, "  {}: {}", field, s)?,
                other => writeln!(f, "  {}: {}", field, other)?,
            }
        }

        writeln!(f, "\nUpdated: {}", self.updated_at.to_rfc3339())?;

        Ok(())
    }
}
