//! attestor-core
//!
//! Core building blocks for the attestor validator agent.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, proof, events, state, errors）
//! - **ports**: 抽象化レイヤー（TaskOracle, ProofService, Clock, IdGenerator）
//! - **verify**: proof からの文脈抽出と検証判定
//! - **app**: アプリケーションロジック（agent, discovery, orchestrator, acquirer, guard）
//! - **impls**: 実装（InMemoryLedger, StaticProofService など開発用）
//! - **config**: TOML 設定

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod verify;
