//! Status - エージェントの観測用スナップショット

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::orchestrator::ProcessOutcome;
use crate::domain::AttestorError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub in_flight: usize,
    pub submitted_valid: u64,
    pub submitted_invalid: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Running totals of attempt outcomes.
#[derive(Debug, Default)]
pub struct AttemptStats {
    submitted_valid: AtomicU64,
    submitted_invalid: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl AttemptStats {
    pub fn record(&self, result: &Result<ProcessOutcome, AttestorError>) {
        let counter = match result {
            Ok(ProcessOutcome::Submitted { is_valid: true }) => &self.submitted_valid,
            Ok(ProcessOutcome::Submitted { is_valid: false }) => &self.submitted_invalid,
            Ok(ProcessOutcome::AlreadyInFlight | ProcessOutcome::Skipped(_)) => &self.skipped,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, in_flight: usize) -> AgentStatus {
        AgentStatus {
            in_flight,
            submitted_valid: self.submitted_valid.load(Ordering::Relaxed),
            submitted_invalid: self.submitted_invalid.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
