//! InMemoryLedger - 開発用・テスト用の ledger
//!
//! # 実装詳細
//! - tokio::sync::Mutex で状態を保護（acquire / submit はロック内で完結 = アトミック）
//! - broadcast で task_created / task_assigned を push
//! - オペレーターごとに `LedgerClient` を発行（競合する複数オペレーターを再現できる）

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast};

use crate::domain::{
    AuditBlob, ClaimRecord, LedgerEvent, OperatorAddress, TaskId, TaskRecord, TaskStatus,
};
use crate::ports::{Clock, Confirmation, OracleError, RevertReason, SystemClock, TaskOracle};

const EVENT_BUFFER: usize = 1024;

/// A confirmed validation write.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub task_id: TaskId,
    pub operator: OperatorAddress,
    pub is_valid: bool,
    pub proof: Vec<u8>,
}

#[derive(Default)]
struct LedgerState {
    tasks: HashMap<TaskId, TaskRecord>,
    claims: HashMap<(String, u64), ClaimRecord>,

    /// Every task ever assigned, per operator, in assignment order.
    assignments: HashMap<OperatorAddress, Vec<TaskId>>,

    /// Every acquisition write received, successful or not.
    acquire_calls: Vec<(TaskId, OperatorAddress)>,

    submissions: Vec<Submission>,

    next_task_id: u64,
    next_tx: u64,
}

impl LedgerState {
    fn confirm(&mut self) -> Confirmation {
        self.next_tx += 1;
        Confirmation {
            reference: format!("0x{:064x}", self.next_tx),
        }
    }

    fn assign(
        &mut self,
        task_id: TaskId,
        operator: &OperatorAddress,
    ) -> Result<Confirmation, OracleError> {
        let task = self
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| OracleError::NotFound(task_id.to_string()))?;

        if !task.status.can_transition_to(TaskStatus::Assigned) {
            let reason = match &task.assigned_operator {
                Some(holder) if task.status == TaskStatus::Assigned => {
                    RevertReason::new("TaskAlreadyAssigned").with_detail(holder.to_string())
                }
                _ => RevertReason::new("TaskNotPending"),
            };
            return Err(OracleError::Reverted(reason));
        }

        task.status = TaskStatus::Assigned;
        task.assigned_operator = Some(operator.clone());
        self.assignments
            .entry(operator.clone())
            .or_default()
            .push(task_id);
        Ok(self.confirm())
    }
}

struct LedgerInner {
    state: Mutex<LedgerState>,
    events: broadcast::Sender<LedgerEvent>,
    clock: Arc<dyn Clock>,
}

/// Shared ledger state. Cheap to clone.
#[derive(Clone)]
pub struct InMemoryLedger {
    inner: Arc<LedgerInner>,
}

impl InMemoryLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(LedgerInner {
                state: Mutex::new(LedgerState::default()),
                events,
                clock,
            }),
        }
    }

    /// Oracle view signing as `operator`.
    pub fn client(&self, operator: OperatorAddress) -> LedgerClient {
        LedgerClient {
            ledger: self.clone(),
            operator,
        }
    }

    pub async fn insert_claim(&self, claim: ClaimRecord) {
        let mut state = self.inner.state.lock().await;
        state
            .claims
            .insert((claim.issue_id.clone(), claim.claim_index), claim);
    }

    /// Create a Pending task for an existing claim and push `task_created`.
    pub async fn create_task(
        &self,
        issue_id: &str,
        claim_index: u64,
        pr_link: &str,
        developer: &str,
    ) -> TaskId {
        let task_id = {
            let mut state = self.inner.state.lock().await;
            state.next_task_id += 1;
            let task_id = TaskId::new(state.next_task_id);
            let record = TaskRecord {
                id: task_id,
                issue_id: issue_id.to_string(),
                claim_index,
                pr_link: pr_link.to_string(),
                developer: developer.to_string(),
                created_at: self.inner.clock.now(),
                status: TaskStatus::Pending,
                assigned_operator: None,
                proof: Vec::new(),
            };
            state.tasks.insert(task_id, record);
            task_id
        };

        self.publish(LedgerEvent::TaskCreated {
            task_id,
            issue_id: issue_id.to_string(),
            claim_index,
        });
        task_id
    }

    /// Ledger-side auto assignment. Pushes `task_assigned` on success.
    pub async fn assign(
        &self,
        task_id: TaskId,
        operator: &OperatorAddress,
    ) -> Result<Confirmation, OracleError> {
        let confirmation = self.inner.state.lock().await.assign(task_id, operator)?;
        self.publish(LedgerEvent::TaskAssigned {
            task_id,
            operator: operator.clone(),
        });
        Ok(confirmation)
    }

    /// Assign without pushing `task_assigned`, as if the notification was lost.
    pub async fn assign_silently(
        &self,
        task_id: TaskId,
        operator: &OperatorAddress,
    ) -> Result<Confirmation, OracleError> {
        self.inner.state.lock().await.assign(task_id, operator)
    }

    /// Push an arbitrary event (duplicates, out-of-order delivery, ...).
    pub fn publish(&self, event: LedgerEvent) {
        // no subscribers is fine
        let _ = self.inner.events.send(event);
    }

    pub async fn task_snapshot(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.inner.state.lock().await.tasks.get(&task_id).cloned()
    }

    pub async fn submissions(&self) -> Vec<Submission> {
        self.inner.state.lock().await.submissions.clone()
    }

    /// Number of acquisition writes `operator` has sent.
    pub async fn acquire_calls_by(&self, operator: &OperatorAddress) -> usize {
        self.inner
            .state
            .lock()
            .await
            .acquire_calls
            .iter()
            .filter(|(_, op)| op == operator)
            .count()
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

/// `TaskOracle` implementation over an `InMemoryLedger` for one operator.
#[derive(Clone)]
pub struct LedgerClient {
    ledger: InMemoryLedger,
    operator: OperatorAddress,
}

impl LedgerClient {
    pub fn ledger(&self) -> &InMemoryLedger {
        &self.ledger
    }
}

#[async_trait]
impl TaskOracle for LedgerClient {
    fn operator(&self) -> &OperatorAddress {
        &self.operator
    }

    async fn task(&self, id: TaskId) -> Result<TaskRecord, OracleError> {
        self.ledger
            .task_snapshot(id)
            .await
            .ok_or_else(|| OracleError::NotFound(id.to_string()))
    }

    async fn claim(&self, issue_id: &str, claim_index: u64) -> Result<ClaimRecord, OracleError> {
        let state = self.ledger.inner.state.lock().await;
        state
            .claims
            .get(&(issue_id.to_string(), claim_index))
            .cloned()
            .ok_or_else(|| OracleError::NotFound(format!("claim {issue_id}#{claim_index}")))
    }

    async fn task_ids_by_operator(
        &self,
        operator: &OperatorAddress,
    ) -> Result<Vec<TaskId>, OracleError> {
        let state = self.ledger.inner.state.lock().await;
        Ok(state.assignments.get(operator).cloned().unwrap_or_default())
    }

    async fn acquire(&self, id: TaskId) -> Result<Confirmation, OracleError> {
        let confirmation = {
            let mut state = self.ledger.inner.state.lock().await;
            state.acquire_calls.push((id, self.operator.clone()));
            state.assign(id, &self.operator)?
        };
        self.ledger.publish(LedgerEvent::TaskAssigned {
            task_id: id,
            operator: self.operator.clone(),
        });
        Ok(confirmation)
    }

    async fn submit_validation(
        &self,
        id: TaskId,
        is_valid: bool,
        proof: &AuditBlob,
    ) -> Result<Confirmation, OracleError> {
        let mut state = self.ledger.inner.state.lock().await;
        let task = state
            .tasks
            .get_mut(&id)
            .ok_or_else(|| OracleError::NotFound(id.to_string()))?;

        if !task.is_assigned_to(&self.operator) {
            return Err(OracleError::Reverted(RevertReason::new("NotAssignedOperator")));
        }
        // resubmitting a confirmed validation is a no-op
        if task.status.is_terminal() {
            return Ok(state.confirm());
        }
        if !task.status.can_transition_to(TaskStatus::Validated) {
            return Err(OracleError::Reverted(RevertReason::new("TaskNotAssigned")));
        }
        task.status = TaskStatus::Validated;
        task.proof = proof.as_bytes().to_vec();

        state.submissions.push(Submission {
            task_id: id,
            operator: self.operator.clone(),
            is_valid,
            proof: proof.as_bytes().to_vec(),
        });
        Ok(state.confirm())
    }

    fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.ledger.inner.events.subscribe()
    }
}
