//! Registry error types.
//!
//! Every variant is a normal, typed outcome the caller branches on:
//! admission denials, state conflicts, or the end of a wait. None of them
//! leave the registry in a partial state.

use switchboard_core::RequestId;
use switchboard_settings::SettingsError;
use thiserror::Error;

use crate::store::StoreError;
use crate::types::RequestStatus;

/// Errors building a registry. Nothing is spawned when construction fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings the registry was built from are inconsistent.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// A runtime limit is out of range or inconsistent with another.
    #[error("invalid registry config {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The configured store could not be opened.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors returned by registry operations.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The child already holds its maximum of open requests.
    #[error("child session {child_session_key} already has {limit} pending requests")]
    ChildCapacity {
        /// Asking session.
        child_session_key: String,
        /// Configured cap.
        limit: usize,
    },

    /// The parent is already being asked its maximum of open requests.
    #[error("parent session {parent_session_key} already has {limit} pending requests")]
    ParentCapacity {
        /// Answering session.
        parent_session_key: String,
        /// Configured cap.
        limit: usize,
    },

    /// The child created too many requests inside the rate window.
    #[error(
        "child session {child_session_key} exceeded {limit} requests per {window_ms}ms; retry in {retry_after_ms}ms"
    )]
    RateLimited {
        /// Asking session.
        child_session_key: String,
        /// Creations allowed per window.
        limit: usize,
        /// Window length.
        window_ms: u64,
        /// Time until the oldest logged creation leaves the window.
        retry_after_ms: u64,
    },

    /// No request with this ID exists.
    #[error("orchestrator request not found: {0}")]
    NotFound(RequestId),

    /// The request already reached a terminal status.
    #[error("orchestrator request {request_id} is already {status}")]
    AlreadyTerminal {
        /// Request that was targeted.
        request_id: RequestId,
        /// Its final status.
        status: RequestStatus,
    },

    /// The answer arrived after the deadline; the request is now `timeout`.
    #[error("orchestrator request {request_id} expired before it could be resolved")]
    Expired {
        /// Request that expired.
        request_id: RequestId,
    },

    /// The waiter's cancellation token fired. The request is unaffected.
    #[error("wait for orchestrator request {request_id} was cancelled")]
    WaitCancelled {
        /// Request that was being waited on.
        request_id: RequestId,
    },

    /// The caller's own wait bound elapsed before the request's deadline.
    /// The request is unaffected.
    #[error("gave up waiting for orchestrator request {request_id} after {waited_ms}ms")]
    WaitTimedOut {
        /// Request that was being waited on.
        request_id: RequestId,
        /// How long the caller waited.
        waited_ms: u64,
    },
}

impl RequestError {
    /// Whether trying again later can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ChildCapacity { .. }
            | Self::ParentCapacity { .. }
            | Self::RateLimited { .. }
            | Self::WaitCancelled { .. }
            | Self::WaitTimedOut { .. } => true,
            Self::NotFound(_) | Self::AlreadyTerminal { .. } | Self::Expired { .. } => false,
        }
    }

    /// Error category string for logs and RPC error payloads.
    pub fn category(&self) -> &'static str {
        match self {
            Self::ChildCapacity { .. } | Self::ParentCapacity { .. } => "capacity_exceeded",
            Self::RateLimited { .. } => "rate_limited",
            Self::NotFound(_) => "not_found",
            Self::AlreadyTerminal { .. } => "already_terminal",
            Self::Expired { .. } => "expired",
            Self::WaitCancelled { .. } => "wait_cancelled",
            Self::WaitTimedOut { .. } => "wait_timed_out",
        }
    }
}
