//! App - アプリケーション層
//!
//! ports を組み合わせて parcel のライフサイクルを実装する。
//!
//! # 主要コンポーネント
//! - **ServiceBuilder**: 構築とワイヤリング（Fail-fast）
//! - **ResilienceService**: worker 向けの公開 API
//! - **ActivitySynchronizer**: job card と parcel の突き合わせ（モード行列）
//! - **AuditWriter / AuditDrainLoop**: 監査証跡の同期・非同期書き込み
//! - **TopicSubscriptionRegistry**: payload type の購読
//! - **WorkerGroup**: ActivityWorker を回すタスク群

pub mod audit_drain;
pub mod audit_writer;
pub mod builder;
pub mod service;
pub mod subscriptions;
pub mod synchronizer;
pub mod worker;

pub use self::audit_drain::{AuditDrainLoop, DrainHandle, DrainReport};
pub use self::audit_writer::AuditWriter;
pub use self::builder::{BuildError, ServiceBuilder};
pub use self::service::ResilienceService;
pub use self::subscriptions::TopicSubscriptionRegistry;
pub use self::synchronizer::{ActivitySynchronizer, SyncOutcome, Synchronized, Transition};
pub use self::worker::{ActivityOutcome, ActivityWorker, WorkerGroup, WorkerReport, WorkerSlot};
