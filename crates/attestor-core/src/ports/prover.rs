//! ProofService port - 外部の proof 生成サービス
//!
//! 失敗（通信・フォーマット）はすべて fail-closed。弱いフォールバックは持たない。

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{AccessToken, AttestorError, ProofPayload};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProverError {
    #[error("proof service unreachable: {0}")]
    Transport(String),

    #[error("proof service returned an unusable payload: {0}")]
    Format(String),
}

impl From<ProverError> for AttestorError {
    fn from(err: ProverError) -> Self {
        match err {
            ProverError::Transport(msg) => AttestorError::Transport(msg),
            ProverError::Format(msg) => AttestorError::Format(msg),
        }
    }
}

/// Generates the PR/user proof pair for one pull request.
#[async_trait]
pub trait ProofService: Send + Sync {
    async fn generate(
        &self,
        pr_link: &str,
        access_token: Option<&AccessToken>,
    ) -> Result<ProofPayload, ProverError>;
}
