//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（ledger, proof service）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - ledger（oracle）が source of truth（正本）
//! - proof service の失敗は fail-closed
//! - 時刻と ID は差し替え可能（テスト用）

pub mod clock;
pub mod id_generator;
pub mod oracle;
pub mod prover;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::oracle::{Confirmation, ConflictSignature, OracleError, RevertReason, TaskOracle};
pub use self::prover::{ProofService, ProverError};
