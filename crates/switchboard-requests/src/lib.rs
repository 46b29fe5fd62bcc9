//! # switchboard-requests
//!
//! Orchestrator request registry: a child session asks its parent a
//! question and waits for the answer.
//!
//! - **Admission**: per-child and per-parent pending caps, per-child sliding
//!   rate window, timeout clamping
//! - **State machine**: `pending` / `notified` are open; `resolved`,
//!   `timeout`, `cancelled` and `orphaned` are terminal and final
//! - **Rendezvous**: [`OrchestratorRequestRegistry::wait_for_resolution`]
//!   suspends until the request settles, its deadline passes, the caller
//!   gives up, or a cancellation token fires
//! - **Sweeper**: background deadline enforcement and retention-based GC
//! - **Lifecycle hooks**: cancel or orphan everything tied to a torn-down session
//! - **Persistence**: best-effort mirroring through a [`RequestStore`]
//!   (JSON file, `SQLite`, or in-memory)

#![deny(unsafe_code)]

pub mod admission;
pub mod config;
pub mod errors;
pub mod events;
mod lifecycle;
mod persister;
pub mod registry;
mod rendezvous;
mod state;
pub mod store;
pub mod sweeper;
pub mod types;

pub use config::RegistryConfig;
pub use errors::{ConfigError, RequestError};
pub use events::{RequestEvent, RequestEventEmitter};
pub use registry::OrchestratorRequestRegistry;
pub use store::{JsonFileStore, MemoryStore, RequestStore, SqliteStore, StoreError, open_store};
pub use sweeper::SweepReport;
pub use types::{
    CreateRequestParams, OrchestratorRequestRecord, RegistryStats, RequestPriority, RequestStatus,
    RequestTable,
};

pub use switchboard_core::RequestId;
pub use tokio_util::sync::CancellationToken;
