/// Whole-document JSON persistence
///
/// Each store is one JSON object holding a single named array,
/// e.g. `{"users": [...]}`. Reads never fail: a missing file is an empty
/// collection, an unparsable file is moved aside and treated as empty, and
/// individual malformed records are copied to a `.quarantine` sidecar and
/// skipped. Writes replace the whole file through a temp file + rename and
/// propagate every error.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{AppError, StorageError};

#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
    /// Name of the array inside the document
    collection: &'static str,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>, collection: &'static str) -> Self {
        Self {
            path: path.into(),
            collection,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads every well-formed record of the collection
    pub fn load<R: DeserializeOwned>(&self) -> Vec<R> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No data file yet, starting empty");
                return Vec::new();
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    path = %self.path.display(),
                    "Failed to read data file, starting empty"
                );
                return Vec::new();
            }
        };

        let document: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(document) => document,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    path = %self.path.display(),
                    "Data file is not valid JSON, starting empty"
                );
                self.backup_corrupt();
                return Vec::new();
            }
        };

        let Some(entries) = document.get(self.collection).and_then(|v| v.as_array()) else {
            tracing::warn!(
                path = %self.path.display(),
                collection = self.collection,
                "Data file has no record array, starting empty"
            );
            self.backup_corrupt();
            return Vec::new();
        };

        let mut records = Vec::with_capacity(entries.len());
        let mut malformed = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            match serde_json::from_value::<R>(entry.clone()) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        path = %self.path.display(),
                        index = index,
                        "Skipping malformed record"
                    );
                    malformed.push(entry.clone());
                }
            }
        }
        self.quarantine_values(malformed);

        records
    }

    /// Where rejected records are kept, next to the data file
    pub fn quarantine_path(&self) -> PathBuf {
        let mut path = self.path.clone();
        path.set_extension("json.quarantine");
        path
    }

    /// Appends `records` to the quarantine sidecar so the next `persist`
    /// does not lose them. Failures are logged, never returned.
    pub fn quarantine<R: Serialize>(&self, records: &[R]) {
        let values = records
            .iter()
            .filter_map(|record| serde_json::to_value(record).ok())
            .collect();
        self.quarantine_values(values);
    }

    fn quarantine_values(&self, mut values: Vec<serde_json::Value>) {
        if values.is_empty() {
            return;
        }

        let path = self.quarantine_path();
        let mut kept: Vec<serde_json::Value> = fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
            .and_then(|doc| doc.get(self.collection).and_then(|v| v.as_array()).cloned())
            .unwrap_or_default();
        let added = values.len();
        kept.append(&mut values);

        match self.encode(kept).and_then(|bytes| write_atomic(&path, &bytes)) {
            Ok(()) => tracing::warn!(
                path = %path.display(),
                records = added,
                "Quarantined rejected records"
            ),
            Err(e) => tracing::error!(
                error = %e,
                path = %path.display(),
                "Failed to write quarantine file, rejected records will be lost"
            ),
        }
    }

    fn encode(&self, values: Vec<serde_json::Value>) -> Result<Vec<u8>, AppError> {
        let mut document = serde_json::Map::new();
        document.insert(self.collection.to_string(), serde_json::Value::Array(values));
        serde_json::to_vec_pretty(&serde_json::Value::Object(document))
            .map_err(|e| AppError::from(StorageError::Serialize(e.to_string())))
    }

    /// Rewrites the whole document with `records`
    pub fn persist<R: Serialize>(&self, records: &[R]) -> Result<(), AppError> {
        let values = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Serialize(e.to_string()))?;
        let serialized = self.encode(values)?;

        write_atomic(&self.path, &serialized).inspect_err(|e| {
            tracing::error!(
                error = %e,
                path = %self.path.display(),
                "Failed to persist data file"
            );
        })
    }

    fn backup_corrupt(&self) {
        let mut backup = self.path.clone();
        backup.set_extension(format!("corrupt-{}", chrono::Utc::now().timestamp()));
        if let Err(rename_err) = fs::rename(&self.path, &backup) {
            tracing::error!(
                error = %rename_err,
                original = %self.path.display(),
                backup = %backup.display(),
                "Failed to move corrupt data file aside"
            );
        } else {
            tracing::warn!(backup = %backup.display(), "Moved corrupt data file to backup");
        }
    }
}

/// Writes `bytes` to a sibling temp file, syncs it, then renames it over `path`
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    let mut tmp_path = path.to_path_buf();
    let extension = path
        .extension()
        .map(|ext| format!("{}.tmp", ext.to_string_lossy()))
        .unwrap_or_else(|| "tmp".to_string());
    tmp_path.set_extension(extension);

    let write = || -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(bytes)?;
        file.flush()?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    };

    write().map_err(|e| AppError::from(StorageError::Write(format!("{}: {}", path.display(), e))))
}
