//! Single-document JSON store.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{RequestStore, StoreError};
use crate::types::RequestTable;

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    requests: RequestTable,
}

/// Stores the table as one pretty-printed JSON document.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// crash mid-write leaves the previous document intact.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store at `path`. Nothing touches disk until the first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl RequestStore for JsonFileStore {
    fn save(&self, table: &RequestTable) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let doc = StoreDocument {
            version: FORMAT_VERSION,
            requests: table.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)?;
        let tmp = self.temp_path();
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = ?self.path, records = table.len(), "request table saved");
        Ok(())
    }

    fn load(&self) -> Result<RequestTable, StoreError> {
        if !self.path.exists() {
            return Ok(RequestTable::new());
        }
        let content = std::fs::read(&self.path)?;
        let doc: StoreDocument = serde_json::from_slice(&content)?;
        if doc.version != FORMAT_VERSION {
            return Err(StoreError::Corrupt(format!(
                "unsupported format version {}",
                doc.version
            )));
        }
        Ok(doc.requests)
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
