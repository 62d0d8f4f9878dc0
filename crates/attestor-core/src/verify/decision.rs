//! ValidationDecision - 抽出した事実から verdict と監査用 blob を作る
//!
//! # 判定ルール
//! - is_merged     = PR の `merged` が文字列 "true" と一致
//! - is_valid_user = PR login == user login（どちらか欠けていれば false）
//! - is_valid_id   = PR id == user id（どちらか欠けていれば false）
//! - is_valid      = 3 つすべて true
//!
//! エラーは決して「valid」に丸めない（fail-closed）。

use std::sync::Arc;

use serde_json::json;

use super::extractor::{ExtractedContexts, ProofExtractor};
use crate::domain::{AttestorError, AuditBlob, ProofPayload, Verdict, VerifiedFacts};
use crate::ports::Clock;

/// Both present and equal.
fn both_equal(a: &Option<String>, b: &Option<String>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a == b)
}

impl VerifiedFacts {
    pub fn from_contexts(ctx: &ExtractedContexts) -> Self {
        let is_merged = ctx.merged().as_deref() == Some("true");
        let pr_login = ctx.pr_login();
        let pr_id = ctx.pr_id();
        let user_login = ctx.user_login();
        let user_id = ctx.user_id();

        let is_valid_user = both_equal(&pr_login, &user_login);
        let is_valid_id = both_equal(&pr_id, &user_id);

        Self {
            is_merged,
            pr_login,
            pr_id,
            user_login,
            user_id,
            is_valid_user,
            is_valid_id,
            is_valid: is_merged && is_valid_user && is_valid_id,
        }
    }
}

pub struct ValidationDecision {
    clock: Arc<dyn Clock>,
}

impl ValidationDecision {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Extract, decide, and record.
    pub fn decide(&self, payload: &ProofPayload) -> Result<Verdict, AttestorError> {
        let contexts = ProofExtractor::extract(payload)?;
        let facts = VerifiedFacts::from_contexts(&contexts);
        let audit = self.audit_blob(payload, &facts)?;
        Ok(Verdict { facts, audit })
    }

    fn audit_blob(
        &self,
        payload: &ProofPayload,
        facts: &VerifiedFacts,
    ) -> Result<AuditBlob, AttestorError> {
        let record = json!({
            "prProof": payload.pr_proof,
            "userProof": payload.user_proof,
            "facts": facts,
            "timestamp": self.clock.now().to_rfc3339(),
        });
        let bytes = serde_json::to_vec(&record)
            .map_err(|e| AttestorError::Format(format!("serialize audit blob: {e}")))?;
        Ok(AuditBlob::new(bytes))
    }
}
