//! LocalParcelStore - ノードローカルの parcel 正本（Standalone 用）

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{ParcelId, ResilienceParcel};
use crate::error::ParcelError;
use crate::ports::ParcelStore;
use crate::ports::parcel_store::{ensure_updatable, holds_same_work};

/// BTreeMap なので list() は ParcelId（ULID）順
#[derive(Default)]
pub struct LocalParcelStore {
    parcels: RwLock<BTreeMap<ParcelId, ResilienceParcel>>,
}

impl LocalParcelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ParcelStore for LocalParcelStore {
    async fn add(&self, parcel: ResilienceParcel) -> Result<(), ParcelError> {
        self.parcels.write().await.insert(parcel.identifier(), parcel);
        Ok(())
    }

    async fn get(&self, id: ParcelId) -> Result<Option<ResilienceParcel>, ParcelError> {
        Ok(self.parcels.read().await.get(&id).cloned())
    }

    async fn remove(&self, id: ParcelId) -> Result<Option<ResilienceParcel>, ParcelError> {
        Ok(self.parcels.write().await.remove(&id))
    }

    async fn update(&self, parcel: ResilienceParcel) -> Result<(), ParcelError> {
        let mut parcels = self.parcels.write().await;
        if let Some(current) = parcels.get(&parcel.identifier()) {
            ensure_updatable(current)?;
        }
        parcels.insert(parcel.identifier(), parcel);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ResilienceParcel>, ParcelError> {
        Ok(self.parcels.read().await.values().cloned().collect())
    }

    /// 検索と挿入を同じ write lock の下で行う
    async fn register_exclusive(&self, parcel: ResilienceParcel) -> Result<Option<ResilienceParcel>, ParcelError> {
        let mut parcels = self.parcels.write().await;
        if let Some(existing) = parcels.values().find(|p| holds_same_work(p, &parcel)) {
            return Ok(Some(existing.clone()));
        }
        parcels.insert(parcel.identifier(), parcel);
        Ok(None)
    }
}
