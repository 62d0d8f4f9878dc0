//! Verify - proof payload の検証
//!
//! - **extractor**: payload から PR / user の context を取り出す
//! - **decision**: 事実を verdict と監査用 blob にまとめる

pub mod decision;
pub mod extractor;

pub use self::decision::ValidationDecision;
pub use self::extractor::{ExtractedContexts, ProofExtractor, SubjectContext};
