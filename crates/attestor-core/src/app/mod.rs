//! App - アプリケーション層
//!
//! ports を組み合わせて、タスクの発見から検証結果の提出までを実装します。
//!
//! # 主要コンポーネント
//! - **Agent**: discovery と dispatcher を常駐させる外側の殻
//! - **TaskDiscovery**: push / poll を 1 本の候補ストリームにまとめる
//! - **Orchestrator**: 1 タスク分のパイプライン（guard→acquire→fetch→verify→submit）
//! - **TaskAcquirer**: 楽観的な acquire と競合の解決
//! - **ProcessingGuard**: 同一タスクの並行処理を防ぐ RAII ガード

pub mod acquirer;
pub mod agent;
pub mod deadline;
pub mod discovery;
pub mod guard;
pub mod orchestrator;
pub mod status;

// 主要な型を再エクスポート
pub use self::acquirer::{PickUp, SkipReason, TaskAcquirer};
pub use self::agent::Agent;
pub use self::discovery::TaskDiscovery;
pub use self::guard::{GuardTicket, InFlight, ProcessingGuard};
pub use self::orchestrator::{Orchestrator, ProcessOutcome};
pub use self::status::AgentStatus;
