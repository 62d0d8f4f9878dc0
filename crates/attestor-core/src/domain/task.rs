//! Task and claim records as read from the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{OperatorAddress, TaskId};

/// Task status on the ledger.
///
/// State transitions:
/// - Pending -> Assigned -> Validated
///
/// The ledger never moves a task backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Created, no operator holds it yet.
    Pending,

    /// Held by exactly one operator.
    Assigned,

    /// Validation submitted and confirmed.
    Validated,
}

impl TaskStatus {
    /// Is `next` a legal successor of `self`?
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Assigned)
                | (TaskStatus::Assigned, TaskStatus::Validated)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Validated)
    }
}

/// A task as stored by the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub issue_id: String,
    pub claim_index: u64,
    pub pr_link: String,
    pub developer: String,
    pub created_at: DateTime<Utc>,
    pub status: TaskStatus,
    pub assigned_operator: Option<OperatorAddress>,

    /// Audit blob submitted with the validation (empty until Validated).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub proof: Vec<u8>,
}

impl TaskRecord {
    pub fn is_assigned_to(&self, operator: &OperatorAddress) -> bool {
        self.assigned_operator.as_ref() == Some(operator)
    }

    /// Assigned, and to `operator`.
    pub fn is_held_by(&self, operator: &OperatorAddress) -> bool {
        self.status == TaskStatus::Assigned && self.is_assigned_to(operator)
    }
}

/// Secret credential attached to a claim.
///
/// Only handed to the proof service; `Debug` is redacted and the type is never
/// serialized.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// The developer submission behind a task. Read-only on this side.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimRecord {
    pub issue_id: String,
    pub claim_index: u64,
    pub pr_link: String,
    pub is_merged: bool,
    pub developer: String,
    pub is_validated: bool,
    pub timestamp: DateTime<Utc>,
    pub access_token: Option<AccessToken>,
}
