//! ProofExtractor - proof payload から context を取り出す
//!
//! # フロー
//! 1. payload を JSON 文字列にシリアライズし、`"context": "<escaped JSON>"` を全て探す
//!    （2 個未満なら Extraction エラー）
//! 2. 各マッチを JSON 文字列リテラルとしてデコード → JSON としてパース
//!    （失敗した断片は空のレコードになる。全体は止めない）
//! 3. パース済み context からキー検索で `merged` / `login` / `id` を読む
//!
//! # 前提
//! 1 個目のマッチが PR、2 個目が user。構造上のタグはなく、payload の
//! 組み立て順に依存している。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::domain::{AttestorError, ProofPayload};

static CONTEXT_PATTERN: OnceLock<Regex> = OnceLock::new();

/// `"context"` key followed by a JSON string literal; group 1 is the literal
/// body, still escaped.
fn context_pattern() -> &'static Regex {
    CONTEXT_PATTERN.get_or_init(|| {
        Regex::new(r#""context"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("context pattern compiles")
    })
}

/// One parsed context fragment.
///
/// A fragment that could not be decoded is kept as an empty object so every
/// lookup on it returns `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectContext {
    doc: Value,
}

impl SubjectContext {
    pub fn empty() -> Self {
        Self {
            doc: Value::Object(serde_json::Map::new()),
        }
    }

    /// Decode the escaped body of a JSON string literal, then parse it.
    pub fn parse_escaped(escaped: &str) -> Self {
        let quoted = format!("\"{escaped}\"");
        let text = match serde_json::from_str::<String>(&quoted) {
            Ok(text) => text,
            Err(e) => {
                debug!(error = %e, "context fragment is not a valid string literal");
                return Self::empty();
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(doc) => Self { doc },
            Err(e) => {
                debug!(error = %e, "context fragment is not valid JSON");
                Self::empty()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.doc {
            Value::Object(map) => map.is_empty(),
            Value::Null => true,
            _ => false,
        }
    }

    /// First scalar stored under `key`, searching nested objects and arrays
    /// depth-first. Booleans and numbers come back in their JSON spelling.
    pub fn field(&self, key: &str) -> Option<String> {
        find_scalar(&self.doc, key)
    }
}

fn find_scalar(value: &Value, key: &str) -> Option<String> {
    match value {
        Value::Object(map) => {
            if let Some(found) = map.get(key).and_then(scalar_text) {
                return Some(found);
            }
            map.values().find_map(|child| find_scalar(child, key))
        }
        Value::Array(items) => items.iter().find_map(|child| find_scalar(child, key)),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Contexts of the two proof subjects, in payload order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedContexts {
    pub pr: SubjectContext,
    pub user: SubjectContext,
}

impl ExtractedContexts {
    /// `merged` is only read from the PR subject.
    pub fn merged(&self) -> Option<String> {
        self.pr.field("merged")
    }

    pub fn pr_login(&self) -> Option<String> {
        self.pr.field("login")
    }

    pub fn pr_id(&self) -> Option<String> {
        self.pr.field("id")
    }

    pub fn user_login(&self) -> Option<String> {
        self.user.field("login")
    }

    pub fn user_id(&self) -> Option<String> {
        self.user.field("id")
    }
}

pub struct ProofExtractor;

impl ProofExtractor {
    pub fn extract(payload: &ProofPayload) -> Result<ExtractedContexts, AttestorError> {
        let serialized = serde_json::to_string(payload)
            .map_err(|e| AttestorError::Format(format!("serialize payload: {e}")))?;
        Self::extract_from_str(&serialized)
    }

    /// Same as [`ProofExtractor::extract`] on an already serialized payload.
    pub fn extract_from_str(serialized: &str) -> Result<ExtractedContexts, AttestorError> {
        let fragments: Vec<&str> = context_pattern()
            .captures_iter(serialized)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
            .collect();

        if fragments.len() < 2 {
            return Err(AttestorError::Extraction(format!(
                "expected 2 context fragments, found {}",
                fragments.len()
            )));
        }
        if fragments.len() > 2 {
            debug!(count = fragments.len(), "ignoring context fragments after the second");
        }

        Ok(ExtractedContexts {
            pr: SubjectContext::parse_escaped(fragments[0]),
            user: SubjectContext::parse_escaped(fragments[1]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_fields_from_both_subjects() {
        let payload = ProofPayload::from_contexts(
            &json!({"extractedParameters": {"merged": "true", "login": "alice", "id": "7"}}),
            &json!({"extractedParameters": {"login": "alice", "id": "7"}}),
        );
        let ctx = ProofExtractor::extract(&payload).unwrap();

        assert_eq!(ctx.merged().as_deref(), Some("true"));
        assert_eq!(ctx.pr_login().as_deref(), Some("alice"));
        assert_eq!(ctx.pr_id().as_deref(), Some("7"));
        assert_eq!(ctx.user_login().as_deref(), Some("alice"));
        assert_eq!(ctx.user_id().as_deref(), Some("7"));
    }

    #[test]
    fn merged_is_not_read_from_user_subject() {
        let payload = ProofPayload::from_contexts(
            &json!({"login": "alice", "id": "7"}),
            &json!({"merged": "true", "login": "alice", "id": "7"}),
        );
        let ctx = ProofExtractor::extract(&payload).unwrap();
        assert_eq!(ctx.merged(), None);
    }

    #[test]
    fn non_string_scalars_are_stringified() {
        let payload = ProofPayload::from_contexts(
            &json!({"merged": true, "login": "bob", "id": 42}),
            &json!({"login": "bob", "id": 42}),
        );
        let ctx = ProofExtractor::extract(&payload).unwrap();
        assert_eq!(ctx.merged().as_deref(), Some("true"));
        assert_eq!(ctx.pr_id().as_deref(), Some("42"));
        assert_eq!(ctx.user_id().as_deref(), Some("42"));
    }

    #[test]
    fn fewer_than_two_fragments_is_an_extraction_error() {
        let payload = ProofPayload::new(
            json!({"claimData": {"context": "{\"merged\":\"true\"}"}}),
            json!({"claimData": {"parameters": "{}"}}),
        );
        let err = ProofExtractor::extract(&payload).unwrap_err();
        assert!(matches!(err, AttestorError::Extraction(_)));

        let payload = ProofPayload::new(json!(null), json!(null));
        let err = ProofExtractor::extract(&payload).unwrap_err();
        assert!(matches!(err, AttestorError::Extraction(_)));
    }

    #[test]
    fn malformed_fragment_degrades_to_empty_record() {
        let payload = ProofPayload::new(
            json!({"claimData": {"context": "{not json"}}),
            json!({"claimData": {"context": "{\"login\":\"alice\",\"id\":\"7\"}"}}),
        );
        let ctx = ProofExtractor::extract(&payload).unwrap();

        assert!(ctx.pr.is_empty());
        assert_eq!(ctx.merged(), None);
        assert_eq!(ctx.pr_login(), None);
        assert_eq!(ctx.user_login().as_deref(), Some("alice"));
    }

    #[test]
    fn extra_fragments_after_the_second_are_ignored() {
        let raw = r#"{"a":{"context":"{\"login\":\"x\"}"},"b":{"context":"{\"login\":\"y\"}"},"c":{"context":"{\"login\":\"z\"}"}}"#;
        let ctx = ProofExtractor::extract_from_str(raw).unwrap();
        assert_eq!(ctx.pr_login().as_deref(), Some("x"));
        assert_eq!(ctx.user_login().as_deref(), Some("y"));
    }

    #[test]
    fn tolerates_whitespace_around_the_colon() {
        let raw = r#"{"pr": {"context" : "{\"id\":\"1\"}"}, "user": {"context":   "{\"id\":\"1\"}"}}"#;
        let ctx = ProofExtractor::extract_from_str(raw).unwrap();
        assert_eq!(ctx.pr_id().as_deref(), Some("1"));
        assert_eq!(ctx.user_id().as_deref(), Some("1"));
    }
}
