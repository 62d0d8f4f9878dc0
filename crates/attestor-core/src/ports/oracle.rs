//! TaskOracle port - ledger が実装する正本（source of truth）
//!
//! # 設計原則
//! - タスク状態の権威は oracle にある（このプロセスのメモリは候補に過ぎない）
//! - 書き込み（acquire / submit_validation）は oracle 側でアトミック
//! - 書き込み失敗は構造化された revert reason で返し、
//!   ここで競合（ConflictSignature）かどうかを分類する

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::domain::{AuditBlob, ClaimRecord, LedgerEvent, OperatorAddress, TaskId, TaskRecord};

/// Decoded revert reason of a failed ledger write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertReason {
    /// Error name as declared by the contract (e.g. `TaskAlreadyAssigned`).
    pub name: String,
    pub detail: Option<String>,
}

impl RevertReason {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl std::fmt::Display for RevertReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} ({detail})", self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("reverted: {0}")]
    Reverted(RevertReason),

    #[error("{0} not found")]
    NotFound(String),

    #[error("transport: {0}")]
    Transport(String),
}

/// Revert reasons that mean "another operator got there first".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictSignature {
    TaskAlreadyAssigned,
    TaskNotPending,
}

impl ConflictSignature {
    const KNOWN: [(&'static str, ConflictSignature); 2] = [
        ("TaskAlreadyAssigned", ConflictSignature::TaskAlreadyAssigned),
        ("TaskNotPending", ConflictSignature::TaskNotPending),
    ];

    pub fn name(self) -> &'static str {
        match self {
            ConflictSignature::TaskAlreadyAssigned => "TaskAlreadyAssigned",
            ConflictSignature::TaskNotPending => "TaskNotPending",
        }
    }

    /// Exact match on the revert name; transport errors and unknown reverts
    /// are never conflicts.
    pub fn classify(err: &OracleError) -> Option<ConflictSignature> {
        let OracleError::Reverted(reason) = err else {
            return None;
        };
        Self::KNOWN
            .iter()
            .find(|(name, _)| *name == reason.name)
            .map(|(_, sig)| *sig)
    }
}

impl std::fmt::Display for ConflictSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Receipt for a confirmed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub reference: String,
}

/// Narrow read/write interface to the ledger, bound to one operator.
#[async_trait]
pub trait TaskOracle: Send + Sync {
    /// Operator that signs this client's writes.
    fn operator(&self) -> &OperatorAddress;

    async fn task(&self, id: TaskId) -> Result<TaskRecord, OracleError>;

    async fn claim(&self, issue_id: &str, claim_index: u64) -> Result<ClaimRecord, OracleError>;

    /// Every task id ever assigned to `operator`, whatever its current status.
    async fn task_ids_by_operator(
        &self,
        operator: &OperatorAddress,
    ) -> Result<Vec<TaskId>, OracleError>;

    /// Try to move a Pending task to Assigned for this operator.
    async fn acquire(&self, id: TaskId) -> Result<Confirmation, OracleError>;

    /// Record the verdict. Returns once the ledger has confirmed the write.
    async fn submit_validation(
        &self,
        id: TaskId,
        is_valid: bool,
        proof: &AuditBlob,
    ) -> Result<Confirmation, OracleError>;

    /// Push topics `task_created` and `task_assigned`.
    fn subscribe(&self) -> broadcast::Receiver<LedgerEvent>;
}
