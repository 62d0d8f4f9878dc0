//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）
//!
//! TaskId は ledger が採番するので、ここで作るのは AttemptId だけ。

use crate::domain::AttemptId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator はプロセス内で使う ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（push / poll の両方から使える）
pub trait IdGenerator: Send + Sync {
    fn generate_attempt_id(&self) -> AttemptId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_attempt_id(&self) -> AttemptId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        AttemptId::from(ulid)
    }
}
