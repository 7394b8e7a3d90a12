//! Server-side blob storage over a data directory.
//!
//! Store paths map directly onto the filesystem:
//! ```text
//! <DATA_DIR>/
//!   app_config.json
//!   patients/
//!     p1.json
//!     p2.json
//!   deleted_log/
//!     p7
//! ```
//!
//! Version tokens are computed from file content, so nothing besides the
//! blobs themselves is stored. Check-then-write sequences are not atomic on
//! their own; callers serialize mutations through a write gate.

use repodoc_core::blob::{split_path, version_token};
use repodoc_core::BlobEntry;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// What a store path currently holds.
#[derive(Debug, Clone, PartialEq)]
pub enum Contents {
    File { content: String, version: String },
    Dir(Vec<BlobEntry>),
}

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq)]
pub struct PutOutcome {
    pub version: String,
    /// True if nothing was stored at the path before.
    pub created: bool,
}

/// Errors that can occur during server storage operations.
#[derive(Debug)]
pub enum ServerStorageError {
    /// I/O error reading or writing a file.
    IoError(PathBuf, io::Error),
    /// Path is empty, escapes the data directory, or names a hidden file.
    InvalidPath(String),
    /// Stored file is not valid UTF-8.
    InvalidContent(PathBuf),
    /// Version precondition failed.
    Conflict(String),
}

impl std::fmt::Display for ServerStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStorageError::IoError(path, e) => {
                write!(f, "I/O error for {}: {}", path.display(), e)
            }
            ServerStorageError::InvalidPath(path) => {
                write!(f, "Invalid path: {}", path)
            }
            ServerStorageError::InvalidContent(path) => {
                write!(f, "Stored content is not UTF-8: {}", path.display())
            }
            ServerStorageError::Conflict(path) => {
                write!(f, "Version mismatch for {}", path)
            }
        }
    }
}

impl std::error::Error for ServerStorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerStorageError::IoError(_, e) => Some(e),
            _ => None,
        }
    }
}

/// Filesystem-backed contents storage.
#[derive(Debug, Clone)]
pub struct ServerStorage {
    data_dir: PathBuf,
}

impl ServerStorage {
    /// Creates a new server storage instance.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Resolves a store path to a filesystem path, rejecting traversal.
    fn resolve(&self, path: &str) -> Result<PathBuf, ServerStorageError> {
        let segments =
            split_path(path).ok_or_else(|| ServerStorageError::InvalidPath(path.to_string()))?;
        Ok(segments
            .iter()
            .fold(self.data_dir.clone(), |acc, segment| acc.join(segment)))
    }

    /// Resolves a path that must name a blob, not the root.
    fn resolve_blob(&self, path: &str) -> Result<PathBuf, ServerStorageError> {
        if path.trim_matches('/').is_empty() {
            return Err(ServerStorageError::InvalidPath(path.to_string()));
        }
        self.resolve(path)
    }

    /// Reads a file or lists a directory.
    ///
    /// Returns `Ok(None)` if nothing exists at `path`.
    pub fn read(&self, path: &str) -> Result<Option<Contents>, ServerStorageError> {
        let full = self.resolve(path)?;

        if full.is_dir() {
            return self.list_dir(&full).map(|entries| Some(Contents::Dir(entries)));
        }

        match Self::read_file(&full)? {
            Some(content) => {
                let version = version_token(&content);
                Ok(Some(Contents::File { content, version }))
            }
            None => Ok(None),
        }
    }

    fn read_file(full: &Path) -> Result<Option<String>, ServerStorageError> {
        match fs::read(full) {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| ServerStorageError::InvalidContent(full.to_path_buf())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ServerStorageError::IoError(full.to_path_buf(), e)),
        }
    }

    /// Lists a directory: subdirectories first, then files, each by name.
    /// Hidden entries (including in-progress temp files) are skipped.
    fn list_dir(&self, dir: &Path) -> Result<Vec<BlobEntry>, ServerStorageError> {
        let read_dir =
            fs::read_dir(dir).map_err(|e| ServerStorageError::IoError(dir.to_path_buf(), e))?;

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| ServerStorageError::IoError(dir.to_path_buf(), e))?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let file_type = entry
                .file_type()
                .map_err(|e| ServerStorageError::IoError(entry.path(), e))?;
            if file_type.is_dir() {
                dirs.push(BlobEntry::dir(name));
            } else if file_type.is_file() {
                files.push(BlobEntry::file(name));
            }
        }

        dirs.sort_by(|a, b| a.name.cmp(&b.name));
        files.sort_by(|a, b| a.name.cmp(&b.name));
        dirs.extend(files);
        Ok(dirs)
    }

    /// Writes a blob.
    ///
    /// With `version`, the stored content must hash to it. Without, nothing
    /// may be stored at `path` yet.
    pub fn put(
        &self,
        path: &str,
        content: &str,
        version: Option<&str>,
    ) -> Result<PutOutcome, ServerStorageError> {
        let full = self.resolve_blob(path)?;
        if full.is_dir() {
            return Err(ServerStorageError::Conflict(path.to_string()));
        }

        let current = Self::read_file(&full)?;
        let allowed = match (&current, version) {
            (None, None) => true,
            (Some(stored), Some(expected)) => version_token(stored) == expected,
            _ => false,
        };
        if !allowed {
            return Err(ServerStorageError::Conflict(path.to_string()));
        }

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ServerStorageError::IoError(parent.to_path_buf(), e))?;
        }

        // Write atomically using a hidden temp file + rename
        let file_name = full
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ServerStorageError::InvalidPath(path.to_string()))?;
        let temp_path = full.with_file_name(format!(".{}.tmp", file_name));

        fs::write(&temp_path, content)
            .map_err(|e| ServerStorageError::IoError(temp_path.clone(), e))?;
        fs::rename(&temp_path, &full).map_err(|e| ServerStorageError::IoError(full, e))?;

        Ok(PutOutcome {
            version: version_token(content),
            created: current.is_none(),
        })
    }

    /// Removes a blob if its content still hashes to `version`.
    ///
    /// Returns `Ok(false)` if nothing was stored at `path`.
    pub fn delete(&self, path: &str, version: &str) -> Result<bool, ServerStorageError> {
        let full = self.resolve_blob(path)?;
        if full.is_dir() {
            return Err(ServerStorageError::Conflict(path.to_string()));
        }

        let Some(stored) = Self::read_file(&full)? else {
            return Ok(false);
        };
        if version_token(&stored) != version {
            return Err(ServerStorageError::Conflict(path.to_string()));
        }

        match fs::remove_file(&full) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ServerStorageError::IoError(full, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (ServerStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = ServerStorage::new(temp_dir.path());
        (storage, temp_dir)
    }

    #[test]
    fn test_read_missing_returns_none() {
        let (storage, _temp) = setup();
        assert!(storage.read("patients/p1.json").unwrap().is_none());
        assert!(storage.read("patients").unwrap().is_none());
    }

    #[test]
    fn test_rejects_traversal() {
        let (storage, _temp) = setup();
        assert!(matches!(
            storage.read("../secret"),
            Err(ServerStorageError::InvalidPath(_))
        ));
        assert!(matches!(
            storage.put("patients/.hidden", "x", None),
            Err(ServerStorageError::InvalidPath(_))
        ));
        assert!(matches!(
            storage.put("", "x", None),
            Err(ServerStorageError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_create_then_read() {
        let (storage, temp) = setup();
        let outcome = storage.put("patients/p1.json", "{\"id\":\"p1\"}", None).unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.version, version_token("{\"id\":\"p1\"}"));
        assert!(temp.path().join("patients").join("p1.json").exists());

        match storage.read("patients/p1.json").unwrap() {
            Some(Contents::File { content, version }) => {
                assert_eq!(content, "{\"id\":\"p1\"}");
                assert_eq!(version, outcome.version);
            }
            other => panic!("expected file, got {:?}", other),
        }
    }

    #[test]
    fn test_create_over_existing_conflicts() {
        let (storage, _temp) = setup();
        storage.put("app_config.json", "{}", None).unwrap();
        assert!(matches!(
            storage.put("app_config.json", "{}", None),
            Err(ServerStorageError::Conflict(_))
        ));
    }

    #[test]
    fn test_update_requires_current_version() {
        let (storage, _temp) = setup();
        let v1 = storage.put("patients/p1.json", "one", None).unwrap().version;
        let v2 = storage
            .put("patients/p1.json", "two", Some(v1.as_str()))
            .unwrap();
        assert!(!v2.created);

        assert!(matches!(
            storage.put("patients/p1.json", "three", Some(v1.as_str())),
            Err(ServerStorageError::Conflict(_))
        ));

        // Updating something that vanished also conflicts
        assert!(matches!(
            storage.put("patients/p9.json", "x", Some(v1.as_str())),
            Err(ServerStorageError::Conflict(_))
        ));
    }

    #[test]
    fn test_delete() {
        let (storage, _temp) = setup();
        let v1 = storage.put("patients/p1.json", "one", None).unwrap().version;

        assert!(matches!(
            storage.delete("patients/p1.json", "stale"),
            Err(ServerStorageError::Conflict(_))
        ));
        assert!(storage.delete("patients/p1.json", &v1).unwrap());
        assert!(!storage.delete("patients/p1.json", &v1).unwrap());
        assert!(storage.read("patients/p1.json").unwrap().is_none());
    }

    #[test]
    fn test_listing_order_and_hidden_entries() {
        let (storage, temp) = setup();
        storage.put("patients/p2.json", "b", None).unwrap();
        storage.put("patients/p1.json", "a", None).unwrap();
        storage.put("patients/archive/p0.json", "z", None).unwrap();
        fs::write(temp.path().join("patients").join(".p3.json.tmp"), "partial").unwrap();

        match storage.read("patients").unwrap() {
            Some(Contents::Dir(entries)) => {
                assert_eq!(
                    entries,
                    vec![
                        BlobEntry::dir("archive"),
                        BlobEntry::file("p1.json"),
                        BlobEntry::file("p2.json"),
                    ]
                );
            }
            other => panic!("expected directory, got {:?}", other),
        }
    }

    #[test]
    fn test_root_listing() {
        let (storage, _temp) = setup();
        storage.put("app_config.json", "{}", None).unwrap();
        storage.put("deleted_log/p1", "{}", None).unwrap();

        match storage.read("").unwrap() {
            Some(Contents::Dir(entries)) => {
                assert_eq!(
                    entries,
                    vec![BlobEntry::dir("deleted_log"), BlobEntry::file("app_config.json")]
                );
            }
            other => panic!("expected directory, got {:?}", other),
        }
    }

    #[test]
    fn test_unicode_content() {
        let (storage, _temp) = setup();
        let content = "{\"name\":\"สมชาย 🏥\"}";
        storage.put("patients/p1.json", content, None).unwrap();
        match storage.read("patients/p1.json").unwrap() {
            Some(Contents::File { content: read, .. }) => assert_eq!(read, content),
            other => panic!("expected file, got {:?}", other),
        }
    }
}
