//! Request record types.
//!
//! [`OrchestratorRequestRecord`] is the only persisted entity. Field names
//! are camelCase on the wire and on disk.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use switchboard_core::RequestId;

/// The whole request table, keyed by request ID.
pub type RequestTable = HashMap<RequestId, OrchestratorRequestRecord>;

/// Lifecycle status of a request.
///
/// `Pending` and `Notified` are open; every other status is terminal and
/// never changes again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Stored, parent not yet told.
    Pending,
    /// The delivery collaborator has surfaced it to the parent.
    Notified,
    /// Parent answered.
    Resolved,
    /// Deadline elapsed first.
    Timeout,
    /// Child session was torn down.
    Cancelled,
    /// Parent session was torn down.
    Orphaned,
}

impl RequestStatus {
    /// Whether the request still counts against caps and can transition.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Notified)
    }

    /// Whether the request has reached its final state.
    pub fn is_terminal(self) -> bool {
        !self.is_open()
    }

    /// Stable string form, shared by JSON and SQL.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Notified => "notified",
            Self::Resolved => "resolved",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Orphaned => "orphaned",
        }
    }

    /// Parse the string form produced by [`as_str`](Self::as_str).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "notified" => Some(Self::Notified),
            "resolved" => Some(Self::Resolved),
            "timeout" => Some(Self::Timeout),
            "cancelled" => Some(Self::Cancelled),
            "orphaned" => Some(Self::Orphaned),
            _ => None,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory priority. Has no scheduling effect inside the registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestPriority {
    /// Default.
    #[default]
    Normal,
    /// Caller wants the parent to look sooner.
    High,
}

impl RequestPriority {
    /// Stable string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::High => "high",
        }
    }

    /// Parse the string form; unknown values fall back to `Normal`.
    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "high" => Self::High,
            _ => Self::Normal,
        }
    }
}

/// A question from a child session to its parent, and its outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorRequestRecord {
    /// Primary key.
    pub request_id: RequestId,
    /// Session that asked.
    pub child_session_key: String,
    /// Session expected to answer.
    pub parent_session_key: String,
    /// Agent run this question came from; not part of identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// The question.
    pub message: String,
    /// Extra context for the parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Advisory priority.
    #[serde(default)]
    pub priority: RequestPriority,
    /// Current lifecycle status.
    pub status: RequestStatus,
    /// Creation time, epoch ms.
    pub created_at: i64,
    /// Absolute deadline, epoch ms.
    pub timeout_at: i64,
    /// Parent's answer; only set on resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Session that supplied the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by_session_key: Option<String>,
    /// Set on every terminal transition, never before.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<i64>,
    /// Human-readable reason for a non-resolved ending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OrchestratorRequestRecord {
    /// Whether the record can still transition.
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Whether the record has reached its final state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Timestamp the retention window is measured from.
    pub fn terminal_since(&self) -> i64 {
        self.resolved_at.unwrap_or(self.created_at)
    }
}

/// Input to [`OrchestratorRequestRegistry::create`](crate::OrchestratorRequestRegistry::create).
#[derive(Clone, Debug, Default)]
pub struct CreateRequestParams {
    /// Session asking the question.
    pub child_session_key: String,
    /// Session expected to answer.
    pub parent_session_key: String,
    /// The question.
    pub message: String,
    /// Extra context for the parent.
    pub context: Option<String>,
    /// Defaults to `Normal`.
    pub priority: Option<RequestPriority>,
    /// Requested wait; clamped, defaulted when absent.
    pub timeout_ms: Option<u64>,
    /// Correlating agent run.
    pub run_id: Option<String>,
}

impl CreateRequestParams {
    /// Minimal parameters: who asks whom, and what.
    pub fn new(
        child_session_key: impl Into<String>,
        parent_session_key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            child_session_key: child_session_key.into(),
            parent_session_key: parent_session_key.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    /// Attach context.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: RequestPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Request a wait timeout in milliseconds.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Correlate with an agent run.
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }
}

/// Point-in-time counts for operators.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    /// Records in the table.
    pub total: usize,
    /// `pending` records.
    pub pending: usize,
    /// `notified` records.
    pub notified: usize,
    /// `resolved` records.
    pub resolved: usize,
    /// `timeout` records.
    pub timed_out: usize,
    /// `cancelled` records.
    pub cancelled: usize,
    /// `orphaned` records.
    pub orphaned: usize,
    /// Requests with at least one suspended waiter.
    pub waiters: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
