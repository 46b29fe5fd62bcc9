//! Process-local store, mainly for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::{RequestStore, StoreError};
use crate::types::RequestTable;

/// Keeps the last saved table in memory.
///
/// Failures can be switched on to exercise the registry's best-effort
/// persistence paths.
#[derive(Default)]
pub struct MemoryStore {
    table: Mutex<RequestTable>,
    saves: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that starts out holding `table`.
    pub fn with_table(table: RequestTable) -> Self {
        Self {
            table: Mutex::new(table),
            ..Self::default()
        }
    }

    /// Make every subsequent save and load fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Copy of the last saved table.
    pub fn snapshot(&self) -> RequestTable {
        self.table.lock().clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store set to fail".into()));
        }
        Ok(())
    }
}

impl RequestStore for MemoryStore {
    fn save(&self, table: &RequestTable) -> Result<(), StoreError> {
        self.check()?;
        *self.table.lock() = table.clone();
        let _ = self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self) -> Result<RequestTable, StoreError> {
        self.check()?;
        Ok(self.table.lock().clone())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
