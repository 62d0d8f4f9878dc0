//! Events - ledger の push 通知と、discovery が流す候補
//!
//! push（LedgerEvent）と poll の両方が `Candidate` を同じチャネルに流し、
//! dispatcher が 1 本で消費する。

use serde::{Deserialize, Serialize};

use super::ids::{OperatorAddress, TaskId};

/// Notification pushed by the ledger.
///
/// Delivery order is not causal: `TaskAssigned` may arrive before the
/// matching `TaskCreated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "snake_case")]
pub enum LedgerEvent {
    TaskCreated {
        task_id: TaskId,
        issue_id: String,
        claim_index: u64,
    },
    TaskAssigned {
        task_id: TaskId,
        operator: OperatorAddress,
    },
}

impl LedgerEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            LedgerEvent::TaskCreated { task_id, .. } | LedgerEvent::TaskAssigned { task_id, .. } => {
                *task_id
            }
        }
    }
}

/// Where a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// `TaskCreated` push, after the grace window.
    Created,
    /// `TaskAssigned` push naming this operator.
    Assigned,
    /// Periodic sweep of tasks assigned to this operator.
    Poll,
}

impl std::fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CandidateSource::Created => "created",
            CandidateSource::Assigned => "assigned",
            CandidateSource::Poll => "poll",
        };
        f.write_str(s)
    }
}

/// A task proposed for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub task_id: TaskId,
    pub source: CandidateSource,
}

impl Candidate {
    pub fn new(task_id: TaskId, source: CandidateSource) -> Self {
        Self { task_id, source }
    }
}
