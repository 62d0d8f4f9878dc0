//! Agent configuration.
//!
//! Durations are stored as milliseconds so the TOML file stays flat:
//!
//! ```toml
//! operator = "0xabc..."
//! poll_interval_ms = 30000
//! grace_window_ms = 5000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::OperatorAddress;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {}", .0.join(", "))]
    Invalid(Vec<&'static str>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Address this agent acts as.
    pub operator: OperatorAddress,

    /// Period of the assigned-task sweep.
    pub poll_interval_ms: u64,

    /// Delay between a `task_created` push and the first read of that task.
    pub grace_window_ms: u64,

    pub task_fetch_timeout_ms: u64,
    pub claim_fetch_timeout_ms: u64,

    /// Bound on the acquisition write, including its confirmation.
    pub acquire_timeout_ms: u64,

    /// Proof generation runs off-chain and can take minutes.
    pub proof_timeout_ms: u64,

    pub submit_timeout_ms: u64,

    /// Capacity of the candidate channel shared by push and poll.
    pub candidate_buffer: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            operator: OperatorAddress::new(""),
            poll_interval_ms: 30_000,
            grace_window_ms: 5_000,
            task_fetch_timeout_ms: 10_000,
            claim_fetch_timeout_ms: 10_000,
            acquire_timeout_ms: 60_000,
            proof_timeout_ms: 300_000,
            submit_timeout_ms: 60_000,
            candidate_buffer: 256,
        }
    }
}

impl AgentConfig {
    pub fn for_operator(operator: OperatorAddress) -> Self {
        Self {
            operator,
            ..Self::default()
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration values for consistency and safety.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.operator.is_empty() {
            errors.push("operator must be set");
        }
        if self.poll_interval_ms == 0 {
            errors.push("poll_interval_ms must be greater than 0");
        }
        if self.task_fetch_timeout_ms == 0 {
            errors.push("task_fetch_timeout_ms must be greater than 0");
        }
        if self.claim_fetch_timeout_ms == 0 {
            errors.push("claim_fetch_timeout_ms must be greater than 0");
        }
        if self.acquire_timeout_ms == 0 {
            errors.push("acquire_timeout_ms must be greater than 0");
        }
        if self.proof_timeout_ms == 0 {
            errors.push("proof_timeout_ms must be greater than 0");
        }
        if self.submit_timeout_ms == 0 {
            errors.push("submit_timeout_ms must be greater than 0");
        }
        if self.candidate_buffer == 0 {
            errors.push("candidate_buffer must be greater than 0");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn grace_window(&self) -> Duration {
        Duration::from_millis(self.grace_window_ms)
    }

    pub fn task_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.task_fetch_timeout_ms)
    }

    pub fn claim_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.claim_fetch_timeout_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn proof_timeout(&self) -> Duration {
        Duration::from_millis(self.proof_timeout_ms)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }
}
