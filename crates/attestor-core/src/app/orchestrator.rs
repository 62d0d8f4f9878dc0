//! Orchestrator - 1 タスク分の処理パイプライン
//!
//! # フロー
//! 1. ProcessingGuard に入る（入れなければ何もしない）
//! 2. TaskAcquirer::pick_up() で処理すべきか決める
//! 3. task / claim を期限付きで読む
//! 4. proof を生成して ValidationDecision で判定
//! 5. submit_validation() の確定を待つ
//!
//! どのステージで失敗しても ticket の drop で guard は解放される。
//! 判定に失敗したら submit は送らない（fail-closed）。

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::acquirer::{PickUp, SkipReason, TaskAcquirer};
use super::deadline::within;
use super::guard::{GuardTicket, InFlight, ProcessingGuard};
use super::status::{AgentStatus, AttemptStats};
use crate::config::AgentConfig;
use crate::domain::{AttestorError, PipelineStage, TaskId};
use crate::ports::{Clock, IdGenerator, ProofService, TaskOracle, UlidGenerator};
use crate::verify::ValidationDecision;

/// How one call to [`Orchestrator::process`] ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Another attempt holds the guard for this task.
    AlreadyInFlight,
    Skipped(SkipReason),
    Submitted { is_valid: bool },
}

#[derive(Debug, Clone, Copy)]
struct Deadlines {
    task_fetch: Duration,
    claim_fetch: Duration,
    proof: Duration,
    submit: Duration,
}

pub struct Orchestrator {
    oracle: Arc<dyn TaskOracle>,
    prover: Arc<dyn ProofService>,
    acquirer: TaskAcquirer,
    decision: ValidationDecision,
    guard: ProcessingGuard,
    ids: Box<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    stats: AttemptStats,
    deadlines: Deadlines,
}

impl Orchestrator {
    pub fn new(
        config: &AgentConfig,
        oracle: Arc<dyn TaskOracle>,
        prover: Arc<dyn ProofService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            acquirer: TaskAcquirer::new(
                Arc::clone(&oracle),
                config.task_fetch_timeout(),
                config.acquire_timeout(),
            ),
            decision: ValidationDecision::new(Arc::clone(&clock)),
            guard: ProcessingGuard::new(),
            ids: Box::new(UlidGenerator::new(Arc::clone(&clock))),
            stats: AttemptStats::default(),
            deadlines: Deadlines {
                task_fetch: config.task_fetch_timeout(),
                claim_fetch: config.claim_fetch_timeout(),
                proof: config.proof_timeout(),
                submit: config.submit_timeout(),
            },
            oracle,
            prover,
            clock,
        }
    }

    pub fn guard(&self) -> &ProcessingGuard {
        &self.guard
    }

    pub fn status(&self) -> AgentStatus {
        self.stats.snapshot(self.guard.len())
    }

    /// Run one processing attempt for `task_id`.
    pub async fn process(&self, task_id: TaskId) -> Result<ProcessOutcome, AttestorError> {
        let marker = InFlight {
            attempt: self.ids.generate_attempt_id(),
            since: self.clock.now(),
        };
        let Some(ticket) = self.guard.enter(task_id, marker) else {
            debug!(%task_id, "already in flight");
            let outcome = Ok(ProcessOutcome::AlreadyInFlight);
            self.stats.record(&outcome);
            return outcome;
        };

        let mut stage = PipelineStage::Guarded;
        let result = self.run(&ticket, &mut stage).await;

        match &result {
            Ok(outcome) => debug!(%task_id, attempt = %ticket.attempt(), ?outcome, "attempt finished"),
            Err(e) => {
                warn!(
                    %task_id,
                    attempt = %ticket.attempt(),
                    %stage,
                    kind = ?e.kind(),
                    error = %e,
                    "attempt failed"
                );
                advance(&ticket, &mut stage, PipelineStage::Error);
            }
        }
        self.stats.record(&result);
        drop(ticket);
        result
    }

    async fn run(
        &self,
        ticket: &GuardTicket,
        stage: &mut PipelineStage,
    ) -> Result<ProcessOutcome, AttestorError> {
        let task_id = ticket.task_id();
        let operator = self.oracle.operator();

        advance(ticket, stage, PipelineStage::Acquiring);
        if let PickUp::Skip(reason) = self.acquirer.pick_up(task_id).await? {
            debug!(%task_id, ?reason, "nothing to do");
            return Ok(ProcessOutcome::Skipped(reason));
        }

        advance(ticket, stage, PipelineStage::FetchingTask);
        let task = within(PipelineStage::FetchingTask, self.deadlines.task_fetch, async {
            self.oracle.task(task_id).await.map_err(AttestorError::from_read)
        })
        .await?;
        if !task.is_held_by(operator) {
            return Ok(ProcessOutcome::Skipped(SkipReason::AssignedToOther));
        }

        advance(ticket, stage, PipelineStage::FetchingClaim);
        let claim = within(PipelineStage::FetchingClaim, self.deadlines.claim_fetch, async {
            self.oracle
                .claim(&task.issue_id, task.claim_index)
                .await
                .map_err(AttestorError::from_read)
        })
        .await?;

        advance(ticket, stage, PipelineStage::Verifying);
        let payload = within(PipelineStage::Verifying, self.deadlines.proof, async {
            self.prover
                .generate(&claim.pr_link, claim.access_token.as_ref())
                .await
                .map_err(AttestorError::from)
        })
        .await?;
        let verdict = self.decision.decide(&payload)?;

        advance(ticket, stage, PipelineStage::Submitting);
        let is_valid = verdict.is_valid();
        let confirmation = within(PipelineStage::Submitting, self.deadlines.submit, async {
            self.oracle
                .submit_validation(task_id, is_valid, &verdict.audit)
                .await
                .map_err(|source| AttestorError::Submission { task_id, source })
        })
        .await?;

        advance(ticket, stage, PipelineStage::Done);
        info!(
            %task_id,
            attempt = %ticket.attempt(),
            is_valid,
            is_merged = verdict.facts.is_merged,
            is_valid_user = verdict.facts.is_valid_user,
            is_valid_id = verdict.facts.is_valid_id,
            tx = %confirmation.reference,
            "validation submitted"
        );
        Ok(ProcessOutcome::Submitted { is_valid })
    }
}

/// Happy-path steps must follow `PipelineStage::next`; Error is reachable from
/// any non-terminal stage.
fn advance(ticket: &GuardTicket, stage: &mut PipelineStage, next: PipelineStage) {
    debug_assert!(
        stage.next() == Some(next) || (next == PipelineStage::Error && !stage.is_terminal()),
        "illegal stage transition {stage} -> {next}"
    );
    debug!(task_id = %ticket.task_id(), attempt = %ticket.attempt(), from = %stage, to = %next, "stage");
    *stage = next;
}
