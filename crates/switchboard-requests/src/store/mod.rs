//! Persistence port for the request table.
//!
//! The registry treats persistence as best effort: it mirrors every change
//! through a [`RequestStore`] and loads from it once on `init`, but a failing
//! store never fails a registry operation.

mod json;
mod memory;
mod sqlite;

pub use json::JsonFileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::sync::Arc;

use switchboard_settings::{RequestSettings, StoreBackend, resolve_path};
use thiserror::Error;

use crate::types::RequestTable;

/// Errors from a persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Document could not be encoded or decoded.
    #[error("store serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// `SQLite` failure.
    #[error("store database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Stored data is readable but not something this version understands.
    #[error("store data is corrupt: {0}")]
    Corrupt(String),
    /// Backend refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Where the request table is mirrored.
pub trait RequestStore: Send + Sync {
    /// Replace the stored table with `table`.
    fn save(&self, table: &RequestTable) -> Result<(), StoreError>;

    /// Read the whole stored table. An absent store is an empty table.
    fn load(&self) -> Result<RequestTable, StoreError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Open the backend selected by `settings`.
pub fn open_store(settings: &RequestSettings) -> Result<Arc<dyn RequestStore>, StoreError> {
    let store: Arc<dyn RequestStore> = match settings.store_backend {
        StoreBackend::Json => Arc::new(JsonFileStore::new(resolve_path(&settings.store_path))),
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(&resolve_path(&settings.store_path))?),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };
    Ok(store)
}
