//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryLedger / LedgerClient**: 開発用の ledger（TaskOracle）
//! - **StaticProofService**: 固定の payload を返す ProofService
//!
//! 本番用の ledger クライアントと proof service クライアントは別クレートに置く。

pub mod inmem_ledger;
pub mod static_prover;

pub use self::inmem_ledger::{InMemoryLedger, LedgerClient, Submission};
pub use self::static_prover::StaticProofService;
