//! Domain identifiers (strongly-typed IDs).
//!
//! # ID の種類
//! - **TaskId**: ledger が採番する数値 ID（オラクルが正本）
//! - **OperatorAddress**: オペレーターのアドレス（大文字小文字を区別しない）
//! - **AttemptId**: 1 回の処理試行を識別する ULID（ログの相関用、プロセス内のみ）

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identifier of a Task as assigned by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }
}

impl From<u64> for TaskId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Address of an operator on the ledger.
///
/// Hex addresses arrive in mixed case (checksummed or not), so the value is
/// lowercased on construction and equality is plain string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct OperatorAddress(String);

impl OperatorAddress {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for OperatorAddress {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<OperatorAddress> for String {
    fn from(addr: OperatorAddress) -> Self {
        addr.0
    }
}

impl fmt::Display for OperatorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of one processing attempt of a Task.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttemptId(Ulid);

impl AttemptId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl From<Ulid> for AttemptId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt-{}", self.0)
    }
}
