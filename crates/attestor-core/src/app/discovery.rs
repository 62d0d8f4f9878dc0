//! TaskDiscovery - push と poll を 1 本の候補ストリームにまとめる
//!
//! # 2 つの入力
//! - **push**: task_created（grace window 後に候補化）と、自分宛ての task_assigned
//! - **poll**: 一定間隔で「自分に割り当てられたことのある全 task」を列挙し、
//!   まだ Assigned かつ guard に入っていないものを再度候補にする
//!
//! どちらも mpsc の同じ Sender に流すだけで、状態は一切変更しない。
//! push が取りこぼしても、poll が 1 interval 以内に拾い直す。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::deadline::within;
use super::guard::ProcessingGuard;
use crate::config::AgentConfig;
use crate::domain::{
    AttestorError, Candidate, CandidateSource, LedgerEvent, PipelineStage, TaskId,
};
use crate::ports::TaskOracle;

pub struct TaskDiscovery {
    oracle: Arc<dyn TaskOracle>,
    guard: ProcessingGuard,
    tx: mpsc::Sender<Candidate>,
    grace_window: Duration,
    poll_interval: Duration,
    fetch_timeout: Duration,
}

impl TaskDiscovery {
    pub fn new(
        config: &AgentConfig,
        oracle: Arc<dyn TaskOracle>,
        guard: ProcessingGuard,
        tx: mpsc::Sender<Candidate>,
    ) -> Self {
        Self {
            oracle,
            guard,
            tx,
            grace_window: config.grace_window(),
            poll_interval: config.poll_interval(),
            fetch_timeout: config.task_fetch_timeout(),
        }
    }

    /// Consume push notifications until shutdown or until the subscription
    /// closes.
    pub async fn run_push(
        self: Arc<Self>,
        mut events: broadcast::Receiver<LedgerEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let event = tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                event = events.recv() => event,
            };

            match event {
                Ok(event) => {
                    debug!(task_id = %event.task_id(), "push event");
                    self.on_event(event, &shutdown_rx).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "push subscription lagged, relying on poll");
                }
                Err(RecvError::Closed) => {
                    warn!("push subscription closed, relying on poll");
                    break;
                }
            }
        }
        debug!("push loop stopped");
    }

    async fn on_event(&self, event: LedgerEvent, shutdown_rx: &watch::Receiver<bool>) {
        match event {
            LedgerEvent::TaskCreated { task_id, .. } => {
                self.propose_after_grace(task_id, shutdown_rx.clone());
            }
            LedgerEvent::TaskAssigned { task_id, operator } => {
                if &operator == self.oracle.operator() {
                    self.propose(Candidate::new(task_id, CandidateSource::Assigned))
                        .await;
                }
            }
        }
    }

    /// Auto-assignment may land shortly after creation, so wait before the
    /// first read. Runs detached so the push loop keeps draining events.
    fn propose_after_grace(&self, task_id: TaskId, mut shutdown_rx: watch::Receiver<bool>) {
        let tx = self.tx.clone();
        let grace = self.grace_window;
        tokio::spawn(async move {
            tokio::select! {
                _ = async {
                    // Ref is !Send, keep it inside this branch
                    let _ = shutdown_rx.wait_for(|stop| *stop).await;
                } => {}
                _ = tokio::time::sleep(grace) => {
                    let candidate = Candidate::new(task_id, CandidateSource::Created);
                    if tx.send(candidate).await.is_err() {
                        debug!(%task_id, "dispatcher gone, dropping candidate");
                    }
                }
            }
        });
    }

    async fn propose(&self, candidate: Candidate) {
        debug!(task_id = %candidate.task_id, source = %candidate.source, "proposing");
        if self.tx.send(candidate).await.is_err() {
            debug!(task_id = %candidate.task_id, "dispatcher gone, dropping candidate");
        }
    }

    /// Sweep every `poll_interval` until shutdown. The first sweep runs
    /// immediately.
    pub async fn run_poll(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let proposed = self.sweep(&shutdown_rx).await;
            debug!(proposed, "poll sweep done");
        }
        debug!("poll loop stopped");
    }

    /// One poll pass. Returns how many candidates were proposed.
    pub async fn sweep(&self, shutdown_rx: &watch::Receiver<bool>) -> usize {
        let operator = self.oracle.operator();
        let listed = tokio::time::timeout(
            self.fetch_timeout,
            self.oracle.task_ids_by_operator(operator),
        )
        .await;
        let ids = match listed {
            Ok(Ok(ids)) => ids,
            Ok(Err(e)) => {
                warn!(error = %AttestorError::from_read(e), "poll could not list assigned tasks");
                return 0;
            }
            Err(_) => {
                warn!(after = ?self.fetch_timeout, "poll timed out listing assigned tasks");
                return 0;
            }
        };

        let mut proposed = 0;
        for task_id in ids {
            if *shutdown_rx.borrow() {
                break;
            }
            if self.guard.contains(task_id) {
                continue;
            }

            let task = within(PipelineStage::FetchingTask, self.fetch_timeout, async {
                self.oracle
                    .task(task_id)
                    .await
                    .map_err(AttestorError::from_read)
            })
            .await;
            match task {
                Ok(task) if task.is_held_by(operator) => {
                    self.propose(Candidate::new(task_id, CandidateSource::Poll))
                        .await;
                    proposed += 1;
                }
                Ok(_) => {}
                Err(e) => warn!(%task_id, error = %e, "poll could not read task"),
            }
        }
        proposed
    }
}
