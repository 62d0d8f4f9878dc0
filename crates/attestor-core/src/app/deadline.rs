//! Bounded waits for oracle and proof-service calls.

use std::future::Future;
use std::time::Duration;

use crate::domain::{AttestorError, PipelineStage};

/// Race `fut` against a timer; expiry becomes `AttestorError::Timeout`.
pub async fn within<F, T>(stage: PipelineStage, after: Duration, fut: F) -> Result<T, AttestorError>
where
    F: Future<Output = Result<T, AttestorError>>,
{
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| AttestorError::Timeout { stage, after })?
}
