//! Errors - エラー型と分類
//!
//! # 分類
//! - Transient: 一時的なエラー（次の poll で再試行される）
//! - Permanent: 恒久的なエラー（同じ入力では何度やっても失敗する）
//! - Infrastructure: インフラエラー（oracle / proof service の障害）
//!
//! Conflict だけは acquirer の中で解決され、pipeline の外には出ない。

use std::time::Duration;

use thiserror::Error;

use super::ids::TaskId;
use super::state::PipelineStage;
use crate::ports::oracle::{ConflictSignature, OracleError};

/// ErrorKind は実行エラーの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

/// Errors raised by one processing attempt.
#[derive(Debug, Error)]
pub enum AttestorError {
    #[error("lost acquisition race for {task_id} ({signature})")]
    Conflict {
        task_id: TaskId,
        signature: ConflictSignature,
    },

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: PipelineStage, after: Duration },

    #[error("proof extraction failed: {0}")]
    Extraction(String),

    #[error("malformed proof: {0}")]
    Format(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("acquisition of {task_id} failed: {source}")]
    Acquisition {
        task_id: TaskId,
        #[source]
        source: OracleError,
    },

    #[error("submission for {task_id} failed: {source}")]
    Submission {
        task_id: TaskId,
        #[source]
        source: OracleError,
    },

    #[error("{0} not found on ledger")]
    NotFound(String),
}

impl AttestorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttestorError::Conflict { .. }
            | AttestorError::Timeout { .. }
            | AttestorError::Submission { .. } => ErrorKind::Transient,
            AttestorError::Extraction(_)
            | AttestorError::Format(_)
            | AttestorError::NotFound(_) => ErrorKind::Permanent,
            AttestorError::Transport(_) | AttestorError::Acquisition { .. } => {
                ErrorKind::Infrastructure
            }
        }
    }

    /// Translate a failed acquisition write.
    ///
    /// Known conflict signatures become `Conflict`; everything else is a
    /// genuine fault.
    pub fn from_acquire(task_id: TaskId, err: OracleError) -> Self {
        match ConflictSignature::classify(&err) {
            Some(signature) => AttestorError::Conflict { task_id, signature },
            None => AttestorError::Acquisition {
                task_id,
                source: err,
            },
        }
    }

    /// Translate a failed read.
    pub fn from_read(err: OracleError) -> Self {
        match err {
            OracleError::NotFound(what) => AttestorError::NotFound(what),
            other => AttestorError::Transport(other.to_string()),
        }
    }
}
