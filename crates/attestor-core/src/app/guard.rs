//! ProcessingGuard - task_id ごとの同時実行を 1 本に制限する
//!
//! # 学習ポイント
//! - RAII（Drop）による解放の保証: 成功でもエラーでも panic でも ticket が落ちれば解放
//! - ロックは enter / drop の中で完結させる（await を跨がない）
//!
//! 他プロセスとの排他は扱わない（それは oracle のアトミックな書き込みの役目）。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::domain::{AttemptId, TaskId};

/// What is running for a guarded task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    pub attempt: AttemptId,
    pub since: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessingGuard {
    inflight: Arc<Mutex<HashMap<TaskId, InFlight>>>,
}

impl ProcessingGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `task_id` for one attempt. `None` if another attempt holds it.
    pub fn enter(&self, task_id: TaskId, marker: InFlight) -> Option<GuardTicket> {
        let mut map = self.inflight.lock();
        if map.contains_key(&task_id) {
            return None;
        }
        map.insert(task_id, marker);
        Some(GuardTicket {
            task_id,
            attempt: marker.attempt,
            inflight: Arc::clone(&self.inflight),
        })
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.inflight.lock().contains_key(&task_id)
    }

    pub fn len(&self) -> usize {
        self.inflight.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.lock().is_empty()
    }

    /// Sorted copy of the current entries.
    pub fn snapshot(&self) -> Vec<(TaskId, InFlight)> {
        let mut entries: Vec<_> = self
            .inflight
            .lock()
            .iter()
            .map(|(id, marker)| (*id, *marker))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }
}

/// Proof of holding the guard for one task. Dropping it releases the task.
#[derive(Debug)]
pub struct GuardTicket {
    task_id: TaskId,
    attempt: AttemptId,
    inflight: Arc<Mutex<HashMap<TaskId, InFlight>>>,
}

impl GuardTicket {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }
}

impl Drop for GuardTicket {
    fn drop(&mut self) {
        let mut map = self.inflight.lock();
        // only remove our own entry
        if map.get(&self.task_id).is_some_and(|m| m.attempt == self.attempt) {
            map.remove(&self.task_id);
        }
    }
}
