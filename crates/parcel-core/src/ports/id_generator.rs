//! IdGenerator port - ID 生成の抽象化
//!
//! 各 ID は ULID（時刻でソート可能、調整不要で分散生成可能）。
//! Clock 経由で時刻部分を決めるので、FixedClock を使えばテストで時刻部分が固定される。

use std::sync::Arc;

use ulid::Ulid;

use crate::domain::{AuditEntryId, EpisodeId, ParcelId, UnitOfWorkId};
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn parcel_id(&self) -> ParcelId;

    fn episode_id(&self) -> EpisodeId;

    fn unit_of_work_id(&self) -> UnitOfWorkId;

    fn audit_entry_id(&self) -> AuditEntryId;
}

pub struct UlidGenerator {
    clock: Arc<dyn Clock>,
}

impl UlidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn next(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl IdGenerator for UlidGenerator {
    fn parcel_id(&self) -> ParcelId {
        ParcelId::from_ulid(self.next())
    }

    fn episode_id(&self) -> EpisodeId {
        EpisodeId::from_ulid(self.next())
    }

    fn unit_of_work_id(&self) -> UnitOfWorkId {
        UnitOfWorkId::from_ulid(self.next())
    }

    fn audit_entry_id(&self) -> AuditEntryId {
        AuditEntryId::from_ulid(self.next())
    }
}
