//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **LocalParcelStore**: Standalone 用のノードローカル正本
//! - **ClusteredParcelStore**: ClusterCache 上の共有正本
//! - **InMemoryClusterCache**: 開発用のクラスタキャッシュ
//! - **InMemoryAuditSink / TracingAuditSink / JsonLinesAuditSink**: 監査シンク
//! - **StaticTopology**: 設定ベースのノードトポロジー

pub mod audit_sinks;
pub mod clustered_store;
pub mod inmem_cluster_cache;
pub mod local_store;
pub mod static_topology;

pub use self::audit_sinks::{InMemoryAuditSink, JsonLinesAuditSink, TracingAuditSink};
pub use self::clustered_store::ClusteredParcelStore;
pub use self::inmem_cluster_cache::InMemoryClusterCache;
pub use self::local_store::LocalParcelStore;
pub use self::static_topology::StaticTopology;
