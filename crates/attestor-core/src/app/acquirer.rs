//! TaskAcquirer - 楽観的な acquire と競合の解決
//!
//! # フロー
//! 1. task を読む。Pending でなければ既に決着済み（自分が Assigned なら処理する）
//! 2. Pending なら acquire を書き込む
//!    - 成功 → 処理する
//!    - 競合シグネチャ → 読み直し。自分が持っていれば処理、そうでなければ何もしない
//!    - それ以外の失敗 → この試行は失敗（ここではリトライしない）
//!
//! 勝者を決めるのは oracle だけ。

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::deadline::within;
use crate::domain::{AttestorError, PipelineStage, TaskId, TaskRecord, TaskStatus};
use crate::ports::TaskOracle;

/// Why a candidate needs no work from this operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AssignedToOther,
    AlreadyValidated,
    LostRace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickUp {
    ShouldProcess,
    Skip(SkipReason),
}

pub struct TaskAcquirer {
    oracle: Arc<dyn TaskOracle>,
    fetch_timeout: Duration,
    acquire_timeout: Duration,
}

impl TaskAcquirer {
    pub fn new(
        oracle: Arc<dyn TaskOracle>,
        fetch_timeout: Duration,
        acquire_timeout: Duration,
    ) -> Self {
        Self {
            oracle,
            fetch_timeout,
            acquire_timeout,
        }
    }

    pub async fn pick_up(&self, task_id: TaskId) -> Result<PickUp, AttestorError> {
        let task = self.read(task_id).await?;
        if task.status != TaskStatus::Pending {
            return Ok(self.resolved(&task));
        }

        let acquired = within(PipelineStage::Acquiring, self.acquire_timeout, async {
            self.oracle
                .acquire(task_id)
                .await
                .map_err(|e| AttestorError::from_acquire(task_id, e))
        })
        .await;

        match acquired {
            Ok(confirmation) => {
                info!(%task_id, tx = %confirmation.reference, "acquired task");
                Ok(PickUp::ShouldProcess)
            }
            Err(AttestorError::Conflict { signature, .. }) => {
                debug!(%task_id, %signature, "acquisition conflict, re-reading");
                let task = self.read(task_id).await?;
                if task.is_held_by(self.oracle.operator()) {
                    Ok(PickUp::ShouldProcess)
                } else {
                    Ok(PickUp::Skip(SkipReason::LostRace))
                }
            }
            Err(e) => Err(e),
        }
    }

    fn resolved(&self, task: &TaskRecord) -> PickUp {
        if task.is_held_by(self.oracle.operator()) {
            PickUp::ShouldProcess
        } else if task.status.is_terminal() {
            PickUp::Skip(SkipReason::AlreadyValidated)
        } else {
            PickUp::Skip(SkipReason::AssignedToOther)
        }
    }

    async fn read(&self, task_id: TaskId) -> Result<TaskRecord, AttestorError> {
        within(PipelineStage::Acquiring, self.fetch_timeout, async {
            self.oracle
                .task(task_id)
                .await
                .map_err(AttestorError::from_read)
        })
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::{AuditBlob, ClaimRecord, LedgerEvent, OperatorAddress};
    use crate::impls::{InMemoryLedger, LedgerClient};
    use crate::ports::{Confirmation, OracleError, RevertReason};
    use async_trait::async_trait;
    use tokio::sync::broadcast;

    /// Delegates to a ledger client, but lets a test decide what happens on
    /// `acquire`.
    pub(crate) struct RacingOracle {
        pub inner: LedgerClient,
        /// Someone else's write that lands just before ours.
        pub winner: Option<OperatorAddress>,
        /// Returned instead of forwarding the write.
        pub fail_with: Option<OracleError>,
    }

    #[async_trait]
    impl TaskOracle for RacingOracle {
        fn operator(&self) -> &OperatorAddress {
            self.inner.operator()
        }

        async fn task(&self, id: TaskId) -> Result<TaskRecord, OracleError> {
            self.inner.task(id).await
        }

        async fn claim(&self, issue_id: &str, idx: u64) -> Result<ClaimRecord, OracleError> {
            self.inner.claim(issue_id, idx).await
        }

        async fn task_ids_by_operator(
            &self,
            operator: &OperatorAddress,
        ) -> Result<Vec<TaskId>, OracleError> {
            self.inner.task_ids_by_operator(operator).await
        }

        async fn acquire(&self, id: TaskId) -> Result<Confirmation, OracleError> {
            if let Some(winner) = &self.winner {
                self.inner.ledger().assign_silently(id, winner).await?;
            }
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            self.inner.acquire(id).await
        }

        async fn submit_validation(
            &self,
            id: TaskId,
            is_valid: bool,
            proof: &AuditBlob,
        ) -> Result<Confirmation, OracleError> {
            self.inner.submit_validation(id, is_valid, proof).await
        }

        fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
            self.inner.subscribe()
        }
    }

    fn me() -> OperatorAddress {
        OperatorAddress::new("0xme")
    }

    fn other() -> OperatorAddress {
        OperatorAddress::new("0xother")
    }

    async fn ledger_with_task() -> (InMemoryLedger, TaskId) {
        let ledger = InMemoryLedger::default();
        let id = ledger.create_task("issue-1", 0, "https://x/pull/1", "0xdev").await;
        (ledger, id)
    }

    fn acquirer(oracle: impl TaskOracle + 'static) -> TaskAcquirer {
        TaskAcquirer::new(
            Arc::new(oracle),
            Duration::from_secs(5),
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn pending_task_is_acquired() {
        let (ledger, id) = ledger_with_task().await;
        let pick = acquirer(ledger.client(me())).pick_up(id).await.unwrap();

        assert_eq!(pick, PickUp::ShouldProcess);
        assert!(ledger.task_snapshot(id).await.unwrap().is_held_by(&me()));
        assert_eq!(ledger.acquire_calls_by(&me()).await, 1);
    }

    #[tokio::test]
    async fn already_assigned_to_self_skips_the_write() {
        let (ledger, id) = ledger_with_task().await;
        ledger.assign(id, &me()).await.unwrap();

        let acq = acquirer(ledger.client(me()));
        assert_eq!(acq.pick_up(id).await.unwrap(), PickUp::ShouldProcess);
        assert_eq!(acq.pick_up(id).await.unwrap(), PickUp::ShouldProcess);
        assert_eq!(ledger.acquire_calls_by(&me()).await, 0);
    }

    #[tokio::test]
    async fn assigned_to_other_is_skipped() {
        let (ledger, id) = ledger_with_task().await;
        ledger.assign(id, &other()).await.unwrap();

        let pick = acquirer(ledger.client(me())).pick_up(id).await.unwrap();
        assert_eq!(pick, PickUp::Skip(SkipReason::AssignedToOther));
        assert_eq!(ledger.acquire_calls_by(&me()).await, 0);
    }

    #[tokio::test]
    async fn validated_task_is_skipped() {
        let (ledger, id) = ledger_with_task().await;
        let holder = ledger.client(other());
        holder.acquire(id).await.unwrap();
        holder
            .submit_validation(id, true, &AuditBlob::default())
            .await
            .unwrap();

        let pick = acquirer(ledger.client(me())).pick_up(id).await.unwrap();
        assert_eq!(pick, PickUp::Skip(SkipReason::AlreadyValidated));
    }

    #[tokio::test]
    async fn lost_race_to_other_is_a_noop() {
        let (ledger, id) = ledger_with_task().await;
        let oracle = RacingOracle {
            inner: ledger.client(me()),
            winner: Some(other()),
            fail_with: None,
        };

        let pick = acquirer(oracle).pick_up(id).await.unwrap();
        assert_eq!(pick, PickUp::Skip(SkipReason::LostRace));
        assert!(ledger.task_snapshot(id).await.unwrap().is_held_by(&other()));
    }

    #[tokio::test]
    async fn conflict_resolved_in_our_favour_proceeds() {
        let (ledger, id) = ledger_with_task().await;
        // our own earlier write landed, the retry reports a conflict
        let oracle = RacingOracle {
            inner: ledger.client(me()),
            winner: Some(me()),
            fail_with: Some(OracleError::Reverted(RevertReason::new("TaskAlreadyAssigned"))),
        };

        let pick = acquirer(oracle).pick_up(id).await.unwrap();
        assert_eq!(pick, PickUp::ShouldProcess);
    }

    #[tokio::test]
    async fn task_validated_between_read_and_write_is_a_lost_race() {
        let (ledger, id) = ledger_with_task().await;
        // the other operator's write lands first and the ledger reports the
        // task as no longer pending
        let oracle = RacingOracle {
            inner: ledger.client(me()),
            winner: Some(other()),
            fail_with: Some(OracleError::Reverted(RevertReason::new("TaskNotPending"))),
        };

        let pick = acquirer(oracle).pick_up(id).await.unwrap();

        assert_eq!(pick, PickUp::Skip(SkipReason::LostRace));
        assert_eq!(ledger.acquire_calls_by(&me()).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_acquisition_write_times_out() {
        use crate::app::orchestrator::tests::{Stall, StallingOracle};

        let (ledger, id) = ledger_with_task().await;
        let oracle = StallingOracle::new(ledger.client(me()), Stall::Acquire);

        let err = acquirer(oracle).pick_up(id).await.unwrap_err();
        assert!(matches!(
            err,
            AttestorError::Timeout { stage: PipelineStage::Acquiring, after }
                if after == Duration::from_secs(30)
        ));
        assert_eq!(ledger.task_snapshot(id).await.unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn non_conflict_failure_is_fatal_for_the_attempt() {
        let (ledger, id) = ledger_with_task().await;
        let oracle = RacingOracle {
            inner: ledger.client(me()),
            winner: None,
            fail_with: Some(OracleError::Transport("rpc reset".to_string())),
        };

        let err = acquirer(oracle).pick_up(id).await.unwrap_err();
        assert!(matches!(err, AttestorError::Acquisition { task_id, .. } if task_id == id));
    }

    #[tokio::test]
    async fn missing_task_is_not_found() {
        let ledger = InMemoryLedger::default();
        let err = acquirer(ledger.client(me()))
            .pick_up(TaskId::new(404))
            .await
            .unwrap_err();
        assert!(matches!(err, AttestorError::NotFound(_)));
    }
}
