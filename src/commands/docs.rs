use chrono::Utc;
use clap::Args;
use repodoc_core::{generate_id, Collection, Document, Record, ReconcilingClient, StoreError};
use serde_json::{Map, Value};
use std::io::{self, Write};

use super::OutputFormat;

/// Parses `key=value`. The value is read as JSON when it parses, otherwise
/// it is kept as a plain string.
pub fn parse_assignment(s: &str) -> Result<(String, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing field name in '{}'", s));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// One-line summary of a document's values.
fn summarize(document: &Document, width: usize) -> String {
    let summary = document
        .values()
        .map(|values| {
            values
                .iter()
                .map(|(k, v)| match v {
                    Value::String(s) => format!("{}={}", k, s),
                    other => format!("{}={}", k, other),
                })
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();

    if summary.chars().count() > width {
        let cut: String = summary.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        summary
    }
}

#[derive(Args)]
pub struct ListCommand {
    /// Collection to list
    pub collection: String,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl ListCommand {
    pub async fn run(&self, client: &ReconcilingClient) -> Result<(), Box<dyn std::error::Error>> {
        let collection = Collection::new(&self.collection)?;
        let mut documents = client.refresh(&collection).await?;
        documents.sort_by(|a, b| a.id.cmp(&b.id));

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&documents)?);
            }
            OutputFormat::Text => {
                if documents.is_empty() {
                    println!("No documents found");
                    return Ok(());
                }
                println!("{:<32}  {:<12}  VALUES", "ID", "VERSION");
                println!("{}", "-".repeat(80));
                for doc in &documents {
                    let version: String = doc
                        .version
                        .as_deref()
                        .unwrap_or("")
                        .chars()
                        .take(12)
                        .collect();
                    println!("{:<32}  {:<12}  {}", doc.id, version, summarize(doc, 40));
                }
                println!("\nTotal: {} document(s)", documents.len());
            }
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct ShowCommand {
    /// Collection the document belongs to
    pub collection: String,

    /// Document id
    pub id: String,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl ShowCommand {
    pub async fn run(&self, client: &ReconcilingClient) -> Result<(), Box<dyn std::error::Error>> {
        let collection = Collection::new(&self.collection)?;
        if client.is_pending(&self.id) {
            return Err(format!("Document not found: {} (deleted locally)", self.id).into());
        }

        let document = client
            .sync()
            .read_visible(&collection, &self.id)
            .await?
            .ok_or_else(|| format!("Document not found: {}", self.id))?;

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&document)?);
            }
            OutputFormat::Text => match Record::from_document(&document) {
                Ok(record) => {
                    println!("{}", record);
                    println!("Version: {}", document.version.as_deref().unwrap_or("-"));
                }
                Err(_) => {
                    println!("{}", serde_json::to_string_pretty(&document.payload)?);
                }
            },
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct PutCommand {
    /// Collection to write to
    pub collection: String,

    /// Document id; a new id is generated when omitted
    #[arg(long)]
    pub id: Option<String>,

    /// Model id recorded on new documents (defaults to the collection name)
    #[arg(long)]
    pub model: Option<String>,

    /// Field assignment, e.g. --set name=Somchai (can be repeated)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_assignment, required = true)]
    pub values: Vec<(String, Value)>,
}

impl PutCommand {
    pub async fn run(&self, client: &ReconcilingClient) -> Result<(), Box<dyn std::error::Error>> {
        let collection = Collection::new(&self.collection)?;
        let id = self.id.clone().unwrap_or_else(generate_id);

        let (document, created) = self.prepare(client, &collection, &id).await?;
        let saved = match client.save(&collection, &document).await {
            Ok(saved) => saved,
            Err(e) if e.is_conflict() => {
                return Err(format!(
                    "{} was changed by someone else while saving. Re-run to apply on top of the latest version.",
                    id
                )
                .into());
            }
            Err(e) => return Err(e.into()),
        };

        println!(
            "{} {}/{} (version {})",
            if created { "Created" } else { "Updated" },
            collection,
            saved.id,
            saved.version.as_deref().unwrap_or("-")
        );
        Ok(())
    }

    /// Builds the document to save and reports whether it is a new one.
    ///
    /// A blob that fails validation (e.g. an interrupted write) is replaced
    /// under its current version token. Deleted ids are refused.
    async fn prepare(
        &self,
        client: &ReconcilingClient,
        collection: &Collection,
        id: &str,
    ) -> Result<(Document, bool), Box<dyn std::error::Error>> {
        if client.is_pending(id) || client.sync().tombstones().tombstone(id).await?.is_some() {
            return Err(format!("{} has been deleted and cannot be written", id).into());
        }

        let existing = match client.sync().documents().read_one(collection, id).await {
            Ok(existing) => existing,
            Err(StoreError::Json(e)) => {
                tracing::warn!("{}/{} is not valid JSON: {}", collection, id, e);
                None
            }
            Err(e) => return Err(e.into()),
        };

        let prepared = match existing {
            Some(mut document) => {
                let values = document
                    .payload
                    .entry("values")
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(values) = values {
                    for (key, value) in &self.values {
                        values.insert(key.clone(), value.clone());
                    }
                }
                document.payload.insert(
                    "updatedAt".to_string(),
                    Value::String(Utc::now().to_rfc3339()),
                );
                (document, false)
            }
            None => {
                let model = self.model.clone().unwrap_or_else(|| self.collection.clone());
                let record = self
                    .values
                    .iter()
                    .fold(Record::new(model).with_id(id), |record, (key, value)| {
                        record.with_value(key.clone(), value.clone())
                    });
                let mut document = record.into_document(collection)?;
                document.version = client.sync().documents().stored_version(collection, id).await?;
                if document.version.is_some() {
                    tracing::info!("Replacing unreadable blob for {}/{}", collection, id);
                }
                let created = document.is_new();
                (document, created)
            }
        };
        Ok(prepared)
    }
}

#[derive(Args)]
pub struct DeleteCommand {
    /// Collection the document belongs to
    pub collection: String,

    /// Document id
    pub id: String,

    /// Skip confirmation prompt
    #[arg(long, short)]
    pub force: bool,
}

impl DeleteCommand {
    pub async fn run(&self, client: &ReconcilingClient) -> Result<(), Box<dyn std::error::Error>> {
        let collection = Collection::new(&self.collection)?;

        if !self.force {
            print!("Delete {}/{}? [y/N] ", collection, self.id);
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;

            if !input.trim().eq_ignore_ascii_case("y") {
                println!("Deletion cancelled.");
                return Ok(());
            }
        }

        match client.delete(&collection, &self.id).await {
            Ok(outcome) => {
                println!("Deleted {}/{}", collection, self.id);
                if !outcome.blob_removed {
                    println!("  (the document is tombstoned; its blob could not be removed)");
                }
                Ok(())
            }
            Err(e) => Err(format!(
                "Remote delete of {} failed: {}. It stays hidden locally until 'repodoc pending clear'.",
                self.id, e
            )
            .into()),
        }
    }
}
