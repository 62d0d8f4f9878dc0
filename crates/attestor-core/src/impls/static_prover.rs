//! StaticProofService - 決まった payload を返す proof service（開発用）

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{AccessToken, ProofPayload};
use crate::ports::{ProofService, ProverError};

/// Returns the configured result for every PR.
#[derive(Clone)]
pub struct StaticProofService {
    result: Arc<Mutex<Result<ProofPayload, ProverError>>>,
    calls: Arc<AtomicUsize>,
}

impl StaticProofService {
    pub fn new(payload: ProofPayload) -> Self {
        Self::with_result(Ok(payload))
    }

    pub fn failing(err: ProverError) -> Self {
        Self::with_result(Err(err))
    }

    fn with_result(result: Result<ProofPayload, ProverError>) -> Self {
        Self {
            result: Arc::new(Mutex::new(result)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Proofs for a merged PR by `login` (numeric account `id`).
    pub fn merged_by(login: &str, id: &str) -> Self {
        Self::new(ProofPayload::from_contexts(
            &serde_json::json!({
                "extractedParameters": { "merged": "true", "login": login, "id": id }
            }),
            &serde_json::json!({
                "extractedParameters": { "login": login, "id": id }
            }),
        ))
    }

    pub fn set_result(&self, result: Result<ProofPayload, ProverError>) {
        *self.result.lock() = result;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ProofService for StaticProofService {
    async fn generate(
        &self,
        _pr_link: &str,
        _access_token: Option<&AccessToken>,
    ) -> Result<ProofPayload, ProverError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.result.lock().clone()
    }
}
