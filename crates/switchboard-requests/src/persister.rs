//! Record persister: serialized, coalescing table writes via MPSC.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::store::RequestStore;
use crate::types::RequestTable;

/// Message sent to the persist worker.
enum PersistMsg {
    Save(RequestTable),
    Flush(oneshot::Sender<()>),
}

/// Best-effort mirror of the request table into a [`RequestStore`].
///
/// Snapshots are queued from inside the registry lock, so the worker sees
/// them in mutation order. When several are queued, only the newest is
/// written. Store failures are logged and dropped.
pub(crate) struct RecordPersister {
    tx: mpsc::UnboundedSender<PersistMsg>,
    store: Arc<dyn RequestStore>,
}

impl RecordPersister {
    /// Spawn the worker. Must be called from within a tokio runtime.
    pub(crate) fn new(store: Arc<dyn RequestStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(tokio::spawn(persist_worker(rx, Arc::clone(&store))));
        Self { tx, store }
    }

    /// The backing store.
    pub(crate) fn store(&self) -> &Arc<dyn RequestStore> {
        &self.store
    }

    /// Queue a snapshot without waiting.
    pub(crate) fn save(&self, table: RequestTable) {
        if self.tx.send(PersistMsg::Save(table)).is_err() {
            warn!(store = self.store.name(), "request persist dropped: worker gone");
        }
    }

    /// Wait until every snapshot queued so far has been written (or failed).
    pub(crate) async fn flush(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(PersistMsg::Flush(reply_tx)).is_err() {
            return;
        }
        let _ = reply_rx.await;
    }
}

async fn persist_worker(mut rx: mpsc::UnboundedReceiver<PersistMsg>, store: Arc<dyn RequestStore>) {
    while let Some(first) = rx.recv().await {
        let mut latest = None;
        let mut flushes = Vec::new();
        let mut absorb = |msg: PersistMsg| match msg {
            PersistMsg::Save(table) => latest = Some(table),
            PersistMsg::Flush(reply) => flushes.push(reply),
        };
        absorb(first);
        while let Ok(msg) = rx.try_recv() {
            absorb(msg);
        }

        if let Some(table) = latest {
            match store.save(&table) {
                Ok(()) => debug!(store = store.name(), records = table.len(), "request table persisted"),
                Err(e) => warn!(store = store.name(), error = %e, "failed to persist request table"),
            }
        }
        for reply in flushes {
            let _ = reply.send(());
        }
    }
}
