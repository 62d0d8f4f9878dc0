//! Proof model: payload from the proof service, the facts read out of it, and
//! the blob submitted to the ledger.

use serde::{Deserialize, Serialize};

/// Evidence returned by the proof service.
///
/// Both subjects are opaque JSON documents. Each embeds a `context` field
/// holding a JSON document serialized as a string. Field order matters: the
/// extractor treats the first `context` it meets as the PR subject and the
/// second as the user subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofPayload {
    pub pr_proof: serde_json::Value,
    pub user_proof: serde_json::Value,
}

impl ProofPayload {
    pub fn new(pr_proof: serde_json::Value, user_proof: serde_json::Value) -> Self {
        Self {
            pr_proof,
            user_proof,
        }
    }

    /// Build a payload whose subjects carry the given documents as `context`.
    pub fn from_contexts(pr_context: &serde_json::Value, user_context: &serde_json::Value) -> Self {
        Self::new(
            serde_json::json!({ "claimData": { "context": pr_context.to_string() } }),
            serde_json::json!({ "claimData": { "context": user_context.to_string() } }),
        )
    }
}

/// Facts read from one proof payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedFacts {
    pub is_merged: bool,
    pub pr_login: Option<String>,
    pub pr_id: Option<String>,
    pub user_login: Option<String>,
    pub user_id: Option<String>,
    pub is_valid_user: bool,
    pub is_valid_id: bool,
    pub is_valid: bool,
}

/// Opaque bytes submitted alongside a validation.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct AuditBlob(Vec<u8>);

impl AuditBlob {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for AuditBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuditBlob({} bytes)", self.0.len())
    }
}

/// Result of verification: the facts and the blob that records them.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub facts: VerifiedFacts,
    pub audit: AuditBlob,
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        self.facts.is_valid
    }
}
