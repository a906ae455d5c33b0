//! parcel-core
//!
//! Resilience & audit core for parcel processing pipelines.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, names, status, mode, parcel, job_card, audit）
//! - **ports**: 抽象化レイヤー（ParcelStore, ClusterCache, AuditSink, NodeTopology, Clock, IdGenerator）
//! - **impls**: ports の実装（ローカル / クラスタストア、監査シンク、静的トポロジー）
//! - **queue**: 非同期監査キューとリトライポリシー
//! - **app**: アプリケーション層（service, synchronizer, builder, drain loop, worker group）
//! - **config**: TOML + 環境変数の設定
//! - **observability**: 件数ビュー

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

pub use app::{ResilienceService, ServiceBuilder};
pub use config::ResilienceConfig;
pub use error::{ErrorKind, ParcelError, Result};
pub use observability::ParcelCounts;
