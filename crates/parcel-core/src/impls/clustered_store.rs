//! ClusteredParcelStore - クラスタ共有キャッシュ上の parcel 正本
//!
//! Clustered / Multisite 用。parcel は JSON としてキャッシュに置かれるので、
//! 同じキャッシュを見るメンバーなら誰でも読み書きできる。
//!
//! # キャッシュ上のレイアウト
//! - `resilience.parcels`: ParcelId -> ResilienceParcel
//! - `resilience.uow-parcels`: UnitOfWorkId -> [ParcelId]（登録順、履歴なので削除しない）
//!
//! 分散ロックは使わない。register_exclusive の排他はこのメンバー内だけ。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{ParcelId, ResilienceParcel, UnitOfWorkId};
use crate::error::ParcelError;
use crate::ports::parcel_store::{ensure_updatable, holds_same_work};
use crate::ports::{CacheError, ClusterCache, ParcelStore};

pub const PARCELS_MAP: &str = "resilience.parcels";
pub const UOW_INDEX_MAP: &str = "resilience.uow-parcels";

pub struct ClusteredParcelStore {
    member: String,
    cache: Arc<dyn ClusterCache>,
    registration: Mutex<()>,
}

impl ClusteredParcelStore {
    pub fn new(member: impl Into<String>, cache: Arc<dyn ClusterCache>) -> Self {
        Self {
            member: member.into(),
            cache,
            registration: Mutex::new(()),
        }
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    /// unit of work に対して登録された parcel の ID（登録順）。
    ///
    /// parcel が remove された後も ID は残る。
    pub async fn parcels_for_unit_of_work(&self, unit_of_work: UnitOfWorkId) -> Result<Vec<ParcelId>, ParcelError> {
        self.cache
            .set_members(UOW_INDEX_MAP, &unit_of_work.to_string())
            .await?
            .iter()
            .map(|raw| raw.parse::<ParcelId>())
            .collect()
    }

    async fn load(&self, id: ParcelId) -> Result<Option<ResilienceParcel>, ParcelError> {
        match self.cache.get(PARCELS_MAP, &id.to_string()).await? {
            Some(value) => Ok(Some(decode(value)?)),
            None => Ok(None),
        }
    }

    async fn store(&self, parcel: &ResilienceParcel) -> Result<(), ParcelError> {
        let value = serde_json::to_value(parcel).map_err(CacheError::from)?;
        self.cache
            .put(PARCELS_MAP, &parcel.identifier().to_string(), value)
            .await?;
        Ok(())
    }
}

fn decode(value: serde_json::Value) -> Result<ResilienceParcel, ParcelError> {
    Ok(serde_json::from_value(value).map_err(CacheError::from)?)
}

#[async_trait]
impl ParcelStore for ClusteredParcelStore {
    async fn add(&self, parcel: ResilienceParcel) -> Result<(), ParcelError> {
        self.store(&parcel).await?;
        self.cache
            .add_to_set(
                UOW_INDEX_MAP,
                &parcel.unit_of_work().id.to_string(),
                &parcel.identifier().to_string(),
            )
            .await?;
        debug!(member = %self.member, parcel = %parcel.identifier(), "parcel replicated");
        Ok(())
    }

    async fn get(&self, id: ParcelId) -> Result<Option<ResilienceParcel>, ParcelError> {
        self.load(id).await
    }

    async fn remove(&self, id: ParcelId) -> Result<Option<ResilienceParcel>, ParcelError> {
        match self.cache.remove(PARCELS_MAP, &id.to_string()).await? {
            Some(value) => Ok(Some(decode(value)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, parcel: ResilienceParcel) -> Result<(), ParcelError> {
        if let Some(current) = self.load(parcel.identifier()).await? {
            ensure_updatable(&current)?;
        }
        self.store(&parcel).await
    }

    async fn list(&self) -> Result<Vec<ResilienceParcel>, ParcelError> {
        self.cache
            .entries(PARCELS_MAP)
            .await?
            .into_iter()
            .map(|(_, value)| decode(value))
            .collect()
    }

    fn is_replicated(&self) -> bool {
        true
    }

    /// unit of work の索引だけを見る（全件走査しない）
    async fn register_exclusive(&self, parcel: ResilienceParcel) -> Result<Option<ResilienceParcel>, ParcelError> {
        let _guard = self.registration.lock().await;
        for id in self.parcels_for_unit_of_work(parcel.unit_of_work().id).await? {
            if let Some(current) = self.load(id).await?
                && holds_same_work(&current, &parcel)
            {
                return Ok(Some(current));
            }
        }
        self.add(parcel).await?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EpisodeId, PayloadType, UnitOfWorkRef, WorkerFunction, WorkerId};
    use crate::impls::InMemoryClusterCache;
    use chrono::Utc;
    use ulid::Ulid;

    fn parcel(uow: UnitOfWorkId) -> ResilienceParcel {
        ResilienceParcel::register(
            ParcelId::from_ulid(Ulid::new()),
            EpisodeId::from_ulid(Ulid::new()),
            WorkerId::parse("w1").unwrap(),
            WorkerFunction::parse("ingest").unwrap(),
            UnitOfWorkRef {
                id: uow,
                payload_type: PayloadType::parse("test.shipment.v1").unwrap(),
            },
            Utc::now(),
        )
    }

    fn members() -> (ClusteredParcelStore, ClusteredParcelStore, InMemoryClusterCache) {
        let cache = InMemoryClusterCache::new();
        let a = ClusteredParcelStore::new("node-a", Arc::new(cache.clone()));
        let b = ClusteredParcelStore::new("node-b", Arc::new(cache.clone()));
        (a, b, cache)
    }

    #[tokio::test]
    async fn parcels_are_visible_to_every_member() {
        let (a, b, _) = members();
        let mut p = parcel(UnitOfWorkId::from_ulid(Ulid::new()));
        a.add(p.clone()).await.unwrap();

        assert_eq!(b.get(p.identifier()).await.unwrap(), Some(p.clone()));

        p.activate(Utc::now()).unwrap();
        b.update(p.clone()).await.unwrap();
        assert_eq!(a.get(p.identifier()).await.unwrap(), Some(p));
        assert!(a.is_replicated());
    }

    #[tokio::test]
    async fn unit_of_work_index_outlives_removal() {
        let (a, _, _) = members();
        let uow = UnitOfWorkId::from_ulid(Ulid::new());
        let first = parcel(uow);
        let second = parcel(uow);
        a.add(first.clone()).await.unwrap();
        a.add(second.clone()).await.unwrap();

        a.remove(first.identifier()).await.unwrap();

        assert_eq!(
            a.parcels_for_unit_of_work(uow).await.unwrap(),
            vec![first.identifier(), second.identifier()]
        );
        assert_eq!(a.list().await.unwrap(), vec![second]);
    }

    #[tokio::test]
    async fn cache_outage_surfaces_as_cache_error() {
        let (a, _, cache) = members();
        cache.set_available(false);

        let err = a.add(parcel(UnitOfWorkId::from_ulid(Ulid::new()))).await.unwrap_err();
        assert!(matches!(err, ParcelError::Cache(CacheError::Unavailable(_))));
    }

    #[tokio::test]
    async fn register_exclusive_sees_parcels_added_by_other_members() {
        let (a, b, _) = members();
        let uow = UnitOfWorkId::from_ulid(Ulid::new());
        let first = parcel(uow);
        assert_eq!(a.register_exclusive(first.clone()).await.unwrap(), None);

        let second = parcel(uow);
        assert_eq!(b.register_exclusive(second.clone()).await.unwrap(), Some(first.clone()));
        assert_eq!(b.get(second.identifier()).await.unwrap(), None);

        // 終わった parcel は邪魔しない
        let mut done = first;
        done.transition(crate::domain::ProcessingStatus::Failed, Utc::now()).unwrap();
        a.update(done).await.unwrap();
        assert_eq!(b.register_exclusive(second).await.unwrap(), None);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let (a, _, _) = members();
        let p = parcel(UnitOfWorkId::from_ulid(Ulid::new()));
        a.add(p.clone()).await.unwrap();

        assert_eq!(a.remove(p.identifier()).await.unwrap(), Some(p.clone()));
        assert_eq!(a.remove(p.identifier()).await.unwrap(), None);
    }
}
