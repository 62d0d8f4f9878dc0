//! Agent - discovery と orchestrator を束ねて常駐させる
//!
//! # 構成
//! - push loop / poll loop: [`TaskDiscovery`] が候補を mpsc に流す
//! - dispatcher: 候補を受け取り、guard に無ければ attempt を JoinSet に spawn
//!
//! 停止は `watch` チャネルで通知し、ループを join した後に実行中の attempt を待つ。
//! 1 つの attempt が失敗してもエージェントは止まらない。

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::discovery::TaskDiscovery;
use super::orchestrator::Orchestrator;
use super::status::AgentStatus;
use crate::config::{AgentConfig, ConfigError};
use crate::domain::Candidate;
use crate::ports::{Clock, ProofService, TaskOracle};

pub struct Agent {
    orchestrator: Arc<Orchestrator>,
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl Agent {
    /// Validate `config` and spawn the discovery loops and the dispatcher.
    ///
    /// Must be called inside a tokio runtime. The push subscription is opened
    /// before this returns, so events published afterwards are not missed.
    pub fn start(
        config: AgentConfig,
        oracle: Arc<dyn TaskOracle>,
        prover: Arc<dyn ProofService>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if &config.operator != oracle.operator() {
            return Err(ConfigError::Invalid(vec![
                "operator does not match the oracle's signer",
            ]));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tx, rx) = mpsc::channel(config.candidate_buffer);

        let orchestrator = Arc::new(Orchestrator::new(
            &config,
            Arc::clone(&oracle),
            prover,
            clock,
        ));
        let events = oracle.subscribe();
        let discovery = Arc::new(TaskDiscovery::new(
            &config,
            oracle,
            orchestrator.guard().clone(),
            tx,
        ));

        let joins = vec![
            tokio::spawn(dispatch_loop(
                Arc::clone(&orchestrator),
                rx,
                shutdown_rx.clone(),
            )),
            tokio::spawn(Arc::clone(&discovery).run_push(events, shutdown_rx.clone())),
            tokio::spawn(discovery.run_poll(shutdown_rx)),
        ];

        info!(
            operator = %config.operator,
            poll_interval_ms = config.poll_interval_ms,
            grace_window_ms = config.grace_window_ms,
            "agent started"
        );
        Ok(Self {
            orchestrator,
            shutdown_tx,
            joins,
        })
    }

    /// Number of tasks currently inside the processing guard.
    pub fn in_flight(&self) -> usize {
        self.orchestrator.guard().len()
    }

    pub fn status(&self) -> AgentStatus {
        self.orchestrator.status()
    }

    /// Stop taking new candidates. In-flight attempts keep running.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for the loops and every in-flight attempt.
    pub async fn stop(self) {
        self.request_shutdown();
        for j in self.joins {
            if let Err(e) = j.await {
                error!(error = %e, "agent loop panicked");
            }
        }
        info!("agent stopped");
    }
}

async fn dispatch_loop(
    orchestrator: Arc<Orchestrator>,
    mut rx: mpsc::Receiver<Candidate>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut attempts = JoinSet::new();

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let candidate = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            Some(joined) = attempts.join_next(), if !attempts.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "attempt panicked");
                }
                continue;
            }
            candidate = rx.recv() => match candidate {
                Some(candidate) => candidate,
                None => break,
            },
        };

        if orchestrator.guard().contains(candidate.task_id) {
            debug!(task_id = %candidate.task_id, source = %candidate.source, "already in flight, dropping candidate");
            continue;
        }

        debug!(task_id = %candidate.task_id, source = %candidate.source, "dispatching");
        let orchestrator = Arc::clone(&orchestrator);
        attempts.spawn(async move {
            orchestrator.process(candidate.task_id).await.ok();
        });
    }

    if !attempts.is_empty() {
        info!(in_flight = attempts.len(), "waiting for in-flight attempts");
    }
    while let Some(joined) = attempts.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "attempt panicked during shutdown");
        }
    }
    debug!("dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::orchestrator::tests::assigned_task;
    use crate::domain::{
        AccessToken, ClaimRecord, OperatorAddress, ProofPayload, TaskId, TaskStatus,
    };
    use crate::impls::{InMemoryLedger, StaticProofService};
    use crate::ports::{ProverError, SystemClock};
    use chrono::Utc;
    use std::future::Future;
    use std::time::Duration;

    fn me() -> OperatorAddress {
        OperatorAddress::new("0xme")
    }

    fn config() -> AgentConfig {
        AgentConfig {
            poll_interval_ms: 30_000,
            grace_window_ms: 5_000,
            ..AgentConfig::for_operator(me())
        }
    }

    fn start(ledger: &InMemoryLedger, prover: &StaticProofService) -> Agent {
        Agent::start(
            config(),
            Arc::new(ledger.client(me())),
            Arc::new(prover.clone()),
            Arc::new(SystemClock),
        )
        .unwrap()
    }

    async fn eventually<F, Fut>(mut cond: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        tokio::time::timeout(Duration::from_secs(600), async {
            while !cond().await {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    async fn validated(ledger: &InMemoryLedger, id: TaskId) -> bool {
        ledger
            .task_snapshot(id)
            .await
            .is_some_and(|t| t.status == TaskStatus::Validated)
    }

    async fn insert_claim(ledger: &InMemoryLedger) {
        ledger
            .insert_claim(ClaimRecord {
                issue_id: "issue-7".to_string(),
                claim_index: 0,
                pr_link: "https://github.com/acme/app/pull/7".to_string(),
                is_merged: true,
                developer: "0xdev".to_string(),
                is_validated: false,
                timestamp: Utc::now(),
                access_token: Some(AccessToken::new("ghp_test")),
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn auto_assigned_task_is_validated_after_the_grace_window() {
        let ledger = InMemoryLedger::default();
        insert_claim(&ledger).await;
        let prover = StaticProofService::merged_by("bob", "42");
        let agent = start(&ledger, &prover);
        // let the startup sweep see an empty ledger
        tokio::time::sleep(Duration::from_secs(1)).await;

        let started = tokio::time::Instant::now();
        let id = ledger
            .create_task("issue-7", 0, "https://github.com/acme/app/pull/7", "0xdev")
            .await;
        // auto-assignment without its own push event
        ledger.assign_silently(id, &me()).await.unwrap();

        eventually(|| validated(&ledger, id)).await;
        assert!(started.elapsed() >= Duration::from_secs(5) - Duration::from_millis(1));

        let submissions = ledger.submissions().await;
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].task_id, id);
        assert_eq!(submissions[0].operator, me());
        assert!(submissions[0].is_valid);
        assert_eq!(ledger.acquire_calls_by(&me()).await, 0);

        assert_eq!(agent.status().submitted_valid, 1);
        assert_eq!(agent.in_flight(), 0);
        agent.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn pending_task_is_acquired_then_validated() {
        let ledger = InMemoryLedger::default();
        insert_claim(&ledger).await;
        let prover = StaticProofService::merged_by("bob", "42");
        let agent = start(&ledger, &prover);

        let id = ledger
            .create_task("issue-7", 0, "https://github.com/acme/app/pull/7", "0xdev")
            .await;

        eventually(|| validated(&ledger, id)).await;
        assert_eq!(ledger.acquire_calls_by(&me()).await, 1);
        agent.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn poll_recovers_an_assignment_missed_by_push() {
        let ledger = InMemoryLedger::default();
        // nobody is subscribed yet, so both pushes are lost
        let id = assigned_task(&ledger).await;
        let prover = StaticProofService::merged_by("bob", "42");

        let agent = start(&ledger, &prover);
        eventually(|| validated(&ledger, id)).await;
        agent.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failing_pipeline_keeps_the_agent_running() {
        let ledger = InMemoryLedger::default();
        let prover = StaticProofService::failing(ProverError::Transport("prover down".to_string()));
        let agent = start(&ledger, &prover);

        let id = assigned_task(&ledger).await;
        eventually(|| async { agent.status().failed >= 1 }).await;
        eventually(|| async { agent.in_flight() == 0 }).await;
        assert!(ledger.submissions().await.is_empty());

        // the next poll sweep retries once the prover is back
        prover.set_result(Ok(ProofPayload::from_contexts(
            &serde_json::json!({ "extractedParameters": { "merged": "true", "login": "bob", "id": "42" } }),
            &serde_json::json!({ "extractedParameters": { "login": "bob", "id": "42" } }),
        )));
        eventually(|| validated(&ledger, id)).await;
        assert!(ledger.submissions().await[0].is_valid);
        agent.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn task_held_by_another_operator_is_left_alone() {
        let ledger = InMemoryLedger::default();
        insert_claim(&ledger).await;
        let prover = StaticProofService::merged_by("bob", "42");
        let agent = start(&ledger, &prover);

        let id = ledger
            .create_task("issue-7", 0, "https://github.com/acme/app/pull/7", "0xdev")
            .await;
        ledger
            .assign(id, &OperatorAddress::new("0xother"))
            .await
            .unwrap();

        eventually(|| async { agent.status().skipped >= 1 }).await;
        assert!(ledger.submissions().await.is_empty());
        assert_eq!(prover.calls(), 0);
        agent.stop().await;
    }

    #[tokio::test]
    async fn mismatched_operator_is_rejected() {
        let ledger = InMemoryLedger::default();
        let result = Agent::start(
            config(),
            Arc::new(ledger.client(OperatorAddress::new("0xsomeone"))),
            Arc::new(StaticProofService::merged_by("bob", "42")),
            Arc::new(SystemClock),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn stop_returns_with_nothing_in_flight() {
        let ledger = InMemoryLedger::default();
        let agent = start(&ledger, &StaticProofService::merged_by("bob", "42"));
        agent.request_shutdown();
        agent.stop().await;
    }
}
