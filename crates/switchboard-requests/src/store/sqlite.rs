//! `SQLite`-backed store.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, Row, params};

use super::{RequestStore, StoreError};
use crate::types::{OrchestratorRequestRecord, RequestPriority, RequestStatus, RequestTable};

/// DDL for the request table. Idempotent.
const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS orchestrator_requests (
    request_id TEXT PRIMARY KEY,
    child_session_key TEXT NOT NULL,
    parent_session_key TEXT NOT NULL,
    run_id TEXT,
    message TEXT NOT NULL,
    context TEXT,
    priority TEXT NOT NULL DEFAULT 'normal'
        CHECK(priority IN ('normal', 'high')),
    status TEXT NOT NULL
        CHECK(status IN ('pending', 'notified', 'resolved', 'timeout', 'cancelled', 'orphaned')),
    created_at INTEGER NOT NULL,
    timeout_at INTEGER NOT NULL,
    response TEXT,
    resolved_by_session_key TEXT,
    resolved_at INTEGER,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_orchestrator_requests_child_status
    ON orchestrator_requests(child_session_key, status);
CREATE INDEX IF NOT EXISTS idx_orchestrator_requests_parent_status
    ON orchestrator_requests(parent_session_key, status);
";

/// Mirrors the table into an `orchestrator_requests` table.
///
/// `save` replaces the contents in a single transaction, so readers never
/// see a half-written table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and run migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<(OrchestratorRequestRecord, String)> {
    let status: String = row.get("status")?;
    let priority: String = row.get("priority")?;
    let record = OrchestratorRequestRecord {
        request_id: row.get::<_, String>("request_id")?.into(),
        child_session_key: row.get("child_session_key")?,
        parent_session_key: row.get("parent_session_key")?,
        run_id: row.get("run_id")?,
        message: row.get("message")?,
        context: row.get("context")?,
        priority: RequestPriority::parse_or_default(&priority),
        // patched below once the raw status is validated
        status: RequestStatus::Pending,
        created_at: row.get("created_at")?,
        timeout_at: row.get("timeout_at")?,
        response: row.get("response")?,
        resolved_by_session_key: row.get("resolved_by_session_key")?,
        resolved_at: row.get("resolved_at")?,
        error: row.get("error")?,
    };
    Ok((record, status))
}

impl RequestStore for SqliteStore {
    fn save(&self, table: &RequestTable) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let _ = tx.execute("DELETE FROM orchestrator_requests", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO orchestrator_requests (request_id, child_session_key,
                 parent_session_key, run_id, message, context, priority, status,
                 created_at, timeout_at, response, resolved_by_session_key,
                 resolved_at, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            )?;
            for r in table.values() {
                let _ = stmt.execute(params![
                    r.request_id.as_str(),
                    r.child_session_key,
                    r.parent_session_key,
                    r.run_id,
                    r.message,
                    r.context,
                    r.priority.as_str(),
                    r.status.as_str(),
                    r.created_at,
                    r.timeout_at,
                    r.response,
                    r.resolved_by_session_key,
                    r.resolved_at,
                    r.error,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load(&self) -> Result<RequestTable, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM orchestrator_requests")?;
        let rows = stmt.query_map([], record_from_row)?;

        let mut table = RequestTable::new();
        for row in rows {
            let (mut record, status) = row?;
            record.status = RequestStatus::parse(&status).ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "request {} has unknown status '{status}'",
                    record.request_id
                ))
            })?;
            let _ = table.insert(record.request_id.clone(), record);
        }
        Ok(table)
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::RequestId;

    fn record(id: &str, status: RequestStatus) -> OrchestratorRequestRecord {
        OrchestratorRequestRecord {
            request_id: RequestId::from(id),
            child_session_key: "child".into(),
            parent_session_key: "parent".into(),
            run_id: None,
            message: "deploy?".into(),
            context: None,
            priority: RequestPriority::Normal,
            status,
            created_at: 100,
            timeout_at: 10_100,
            response: None,
            resolved_by_session_key: None,
            resolved_at: None,
            error: None,
        }
    }

    fn table(records: Vec<OrchestratorRequestRecord>) -> RequestTable {
        records
            .into_iter()
            .map(|r| (r.request_id.clone(), r))
            .collect()
    }

    #[test]
    fn empty_database_loads_empty() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn save_replaces_contents() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut resolved = record("req_2", RequestStatus::Resolved);
        resolved.response = Some("ship it".into());
        resolved.resolved_by_session_key = Some("parent".into());
        resolved.resolved_at = Some(500);
        resolved.priority = RequestPriority::High;

        store
            .save(&table(vec![record("req_1", RequestStatus::Pending), resolved.clone()]))
            .unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["req_2"], resolved);

        store.save(&table(vec![resolved])).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(!loaded.contains_key("req_1"));
    }

    #[test]
    fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db").join("requests.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .save(&table(vec![record("req_1", RequestStatus::Notified)]))
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded["req_1"].status, RequestStatus::Notified);
    }

    #[test]
    fn migrations_are_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.conn.lock().execute_batch(SCHEMA).unwrap();
    }
}
