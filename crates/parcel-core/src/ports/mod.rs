//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。parcel の正本、クラスタキャッシュ、
//! 監査シンク、ノードトポロジー、時刻、ID 生成を trait として切り出す。

pub mod audit_sink;
pub mod clock;
pub mod cluster_cache;
pub mod id_generator;
pub mod parcel_store;
pub mod topology;

pub use self::audit_sink::{AuditSink, SinkError};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::cluster_cache::{CacheError, ClusterCache};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::parcel_store::ParcelStore;
pub use self::topology::NodeTopology;
