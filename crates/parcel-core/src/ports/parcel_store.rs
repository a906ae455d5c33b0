//! ParcelStore port - parcel の正本（source of truth）
//!
//! Standalone ではノードローカルの LocalParcelStore、Clustered / Multisite では
//! クラスタ共有キャッシュ上の ClusteredParcelStore が実装する。
//!
//! # 設計原則
//! - 呼び出し側は clone を受け取る。状態変更は必ず update で書き戻す
//! - finalised な parcel は不変（update は InvalidArgument）
//! - remove は冪等（存在しなければ None）

use async_trait::async_trait;
use tracing::warn;

use crate::domain::{EpisodeId, ParcelId, ProcessingStatus, ResilienceParcel, UnitOfWorkId, WorkerId};
use crate::error::ParcelError;

#[async_trait]
pub trait ParcelStore: Send + Sync {
    /// 挿入、または同じ identifier の parcel を置き換える
    async fn add(&self, parcel: ResilienceParcel) -> Result<(), ParcelError>;

    async fn get(&self, id: ParcelId) -> Result<Option<ResilienceParcel>, ParcelError>;

    async fn remove(&self, id: ParcelId) -> Result<Option<ResilienceParcel>, ParcelError>;

    /// upsert。保存済みの parcel が finalised なら InvalidArgument で何も変えない。
    async fn update(&self, parcel: ResilienceParcel) -> Result<(), ParcelError>;

    /// 全件（ParcelId = ULID 順）
    async fn list(&self) -> Result<Vec<ResilienceParcel>, ParcelError>;

    /// クラスタ内で共有されるか（Clustered / Multisite の前提条件）
    fn is_replicated(&self) -> bool {
        false
    }

    async fn list_by_status(&self, status: ProcessingStatus) -> Result<Vec<ResilienceParcel>, ParcelError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|p| p.processing_status() == status)
            .collect())
    }

    async fn active(&self) -> Result<Vec<ResilienceParcel>, ParcelError> {
        self.list_by_status(ProcessingStatus::Active).await
    }

    async fn finished(&self) -> Result<Vec<ResilienceParcel>, ParcelError> {
        self.list_by_status(ProcessingStatus::Finished).await
    }

    async fn finalised(&self) -> Result<Vec<ResilienceParcel>, ParcelError> {
        self.list_by_status(ProcessingStatus::Finalised).await
    }

    /// REGISTERED / INITIATED / ACTIVE
    async fn in_progress(&self) -> Result<Vec<ResilienceParcel>, ParcelError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|p| p.processing_status().is_in_progress())
            .collect())
    }

    async fn find_by_episode(&self, episode: EpisodeId) -> Result<Vec<ResilienceParcel>, ParcelError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|p| p.episode_identifier() == episode)
            .collect())
    }

    /// worker が unit of work に対して持つ進行中の parcel。
    ///
    /// 複数見つかった場合は ULID 順で最初のものを返し、警告を出す。
    async fn find_current_for_worker(
        &self,
        worker: &WorkerId,
        unit_of_work: UnitOfWorkId,
    ) -> Result<Option<ResilienceParcel>, ParcelError> {
        let mut matches = self.in_progress().await?.into_iter().filter(|p| {
            p.associated_worker_identifier() == worker && p.unit_of_work().id == unit_of_work
        });
        let first = matches.next();
        let extra = matches.count();
        if let Some(parcel) = &first
            && extra > 0
        {
            warn!(
                worker = %worker,
                unit_of_work = %unit_of_work,
                chosen = %parcel.identifier(),
                duplicates = extra,
                "multiple in-progress parcels for one worker and unit of work"
            );
        }
        Ok(first)
    }

    /// 同じ worker / unit of work の進行中 parcel が無ければ追加する。
    ///
    /// 既にあればそれを返し、何も書かない。既定実装は find → add の 2 段なので
    /// アトミックではない。複数のサービスが共有するストアは上書きすること。
    async fn register_exclusive(&self, parcel: ResilienceParcel) -> Result<Option<ResilienceParcel>, ParcelError> {
        if let Some(existing) = self
            .find_current_for_worker(parcel.associated_worker_identifier(), parcel.unit_of_work().id)
            .await?
        {
            return Ok(Some(existing));
        }
        self.add(parcel).await?;
        Ok(None)
    }
}

/// 進行中かつ同じ worker / unit of work の parcel か
pub(crate) fn holds_same_work(current: &ResilienceParcel, candidate: &ResilienceParcel) -> bool {
    current.processing_status().is_in_progress()
        && current.associated_worker_identifier() == candidate.associated_worker_identifier()
        && current.unit_of_work().id == candidate.unit_of_work().id
}

/// update 前の共通チェック
pub(crate) fn ensure_updatable(current: &ResilienceParcel) -> Result<(), ParcelError> {
    if current.is_finalised() {
        return Err(ParcelError::invalid_argument(format!(
            "parcel {} is finalised and cannot be updated",
            current.identifier()
        )));
    }
    Ok(())
}
