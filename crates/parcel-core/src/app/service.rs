//! ResilienceService - worker から見た公開 API
//!
//! 登録 → start → finish/failure/cancellation → finalisation → purge を受け付け、
//! 正本・job card・監査証跡を一貫して更新する。
//!
//! # 設計
//! - job card はノードローカル（parcel id ごとに最新の 1 枚）
//! - 監査エントリは状態が実際に変わったとき（登録・Reconciled）だけ書く
//! - purge はデプロイモードに関係なく効く（管理操作であって遷移ではない）

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use super::audit_drain::{AuditDrainLoop, DrainHandle, DrainReport};
use super::audit_writer::AuditWriter;
use super::subscriptions::TopicSubscriptionRegistry;
use super::synchronizer::{ActivitySynchronizer, SyncOutcome, Synchronized, Transition};
use crate::domain::{
    ActivityId, ActivityLink, JobCard, JobCardRequest, ParcelId, PayloadType, ResilienceParcel, StatusElement,
    UnitOfWork, WorkerFunction, WorkerId,
};
use crate::error::ParcelError;
use crate::observability::ParcelCounts;
use crate::ports::{AuditSink, Clock, IdGenerator, NodeTopology, ParcelStore};
use crate::queue::{AsynchronousAuditQueue, RetryPolicy};

pub struct ResilienceService {
    pub(crate) store: Arc<dyn ParcelStore>,
    pub(crate) topology: Arc<dyn NodeTopology>,
    pub(crate) sink: Arc<dyn AuditSink>,
    pub(crate) queue: Arc<AsynchronousAuditQueue>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) synchronizer: ActivitySynchronizer,
    pub(crate) audit: AuditWriter,
    pub(crate) subscriptions: TopicSubscriptionRegistry,
    pub(crate) job_cards: RwLock<HashMap<ParcelId, JobCard>>,
    /// 登録時の検索と挿入をひとまとめにする
    pub(crate) registration: Mutex<()>,
    pub(crate) synchronous_audit: bool,
    pub(crate) retry: RetryPolicy,
    pub(crate) poll_interval: std::time::Duration,
}

impl ResilienceService {
    /// 新しい activity を登録し、REGISTERED の parcel と WAITING の job card を返す。
    ///
    /// 同じ worker が同じ unit of work の進行中 parcel を既に持っていれば InvalidArgument。
    pub async fn register_activity(
        &self,
        request: JobCardRequest,
        unit_of_work: &UnitOfWork,
    ) -> Result<StatusElement, ParcelError> {
        let worker_function = WorkerFunction::parse(&request.worker_function)?;
        let worker = WorkerId::parse(&request.worker_instance)?;

        let now = self.clock.now();
        let episode = request.resolved_episode().unwrap_or_else(|| self.ids.episode_id());
        let parcel = ResilienceParcel::register(
            self.ids.parcel_id(),
            episode,
            worker.clone(),
            worker_function.clone(),
            unit_of_work.reference(),
            now,
        );

        let existing = {
            let _guard = self.registration.lock().await;
            self.store.register_exclusive(parcel.clone()).await?
        };
        if let Some(existing) = existing {
            return Err(ParcelError::invalid_argument(format!(
                "worker {worker} already holds in-progress parcel {} for {}",
                existing.identifier(),
                unit_of_work.id()
            )));
        }

        let card = JobCard::new(
            ActivityId {
                previous: request.previous,
                present: ActivityLink {
                    parcel: parcel.identifier(),
                    episode,
                    worker_function,
                    worker: worker.clone(),
                },
                created_at: now,
            },
            self.topology.modes_for(&worker),
            now,
        );
        self.job_cards.write().await.insert(parcel.identifier(), card.clone());

        info!(
            parcel = %parcel.identifier(),
            %episode,
            %worker,
            unit_of_work = %unit_of_work.id(),
            payload_type = %unit_of_work.payload_type(),
            "activity registered"
        );
        self.record(&parcel).await;

        Ok(StatusElement::new(&parcel, Some(card)))
    }

    pub async fn notify_start(&self, card: JobCard) -> Result<StatusElement, ParcelError> {
        self.notify(card, Transition::Start).await
    }

    /// worker は `current_status` に結果（FINISHED かそれ以外）を入れて呼ぶ。
    pub async fn notify_finish(&self, card: JobCard) -> Result<StatusElement, ParcelError> {
        self.notify(card, Transition::Finish).await
    }

    pub async fn notify_failure(&self, card: JobCard) -> Result<StatusElement, ParcelError> {
        self.notify(card, Transition::Failure).await
    }

    pub async fn notify_cancellation(&self, card: JobCard) -> Result<StatusElement, ParcelError> {
        self.notify(card, Transition::Cancellation).await
    }

    pub async fn notify_finalisation(&self, card: JobCard) -> Result<StatusElement, ParcelError> {
        self.notify(card, Transition::Finalisation).await
    }

    /// parcel と job card を捨てる。存在しなくてもエラーにしない。
    pub async fn notify_purge(&self, card: JobCard) -> Result<(), ParcelError> {
        let parcel_id = card.parcel_id()?;
        let removed = self.store.remove(parcel_id).await?;
        self.job_cards.write().await.remove(&parcel_id);
        match removed {
            Some(parcel) => info!(parcel = %parcel_id, status = %parcel.processing_status(), "parcel purged"),
            None => info!(parcel = %parcel_id, "purge of unknown parcel ignored"),
        }
        Ok(())
    }

    pub async fn status_element(&self, parcel_id: ParcelId) -> Result<Option<StatusElement>, ParcelError> {
        let Some(parcel) = self.store.get(parcel_id).await? else {
            return Ok(None);
        };
        let card = self.job_cards.read().await.get(&parcel_id).cloned();
        Ok(Some(StatusElement::new(&parcel, card)))
    }

    pub async fn subscribe(&self, payload_type: &str, worker: &str) -> Result<(), ParcelError> {
        self.subscriptions.subscribe(payload_type, worker).await
    }

    pub async fn unsubscribe(&self, payload_type: &str, worker: &str) -> Result<bool, ParcelError> {
        self.subscriptions.unsubscribe(payload_type, worker).await
    }

    pub async fn subscribers_for(&self, payload_type: &str) -> BTreeSet<WorkerId> {
        self.subscriptions.subscribers_for(payload_type).await
    }

    pub async fn payload_types(&self) -> BTreeSet<PayloadType> {
        self.subscriptions.payload_types().await
    }

    pub async fn counts(&self) -> Result<ParcelCounts, ParcelError> {
        ParcelCounts::collect(self.store.as_ref(), &self.queue).await
    }

    pub fn store(&self) -> &Arc<dyn ParcelStore> {
        &self.store
    }

    pub fn audit_queue(&self) -> &Arc<AsynchronousAuditQueue> {
        &self.queue
    }

    /// 共有キューとシンクを使うドレインループ（spawn は呼び出し側）
    pub fn audit_drain_loop(&self) -> AuditDrainLoop {
        AuditDrainLoop::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.sink),
            self.retry.clone(),
            self.poll_interval,
        )
    }

    /// 監査キューを閉じ、ドレインループを止めてから残りを flush する。
    ///
    /// シンクが戻らなくても `max_flush_failures` 回続けて失敗した時点で返る。
    /// 残ったエントリはキューに残る（`counts().audit_backlog`）。
    pub async fn shutdown_audit(&self, drain: DrainHandle, max_flush_failures: u32) -> DrainReport {
        self.queue.close();
        drain.shutdown_and_join().await;
        let report = self
            .audit_drain_loop()
            .with_max_flush_failures(max_flush_failures)
            .drain_pending()
            .await;
        if report.gave_up {
            warn!(
                backlog = self.queue.len(),
                failures = report.failures,
                "audit flush gave up, entries left in the queue"
            );
        }
        report
    }

    async fn notify(&self, card: JobCard, transition: Transition) -> Result<StatusElement, ParcelError> {
        let Synchronized { card, outcome } = self.synchronizer.synchronize(card, transition).await?;
        let parcel = match outcome {
            SyncOutcome::Reconciled { parcel } => {
                self.record(&parcel).await;
                parcel
            }
            SyncOutcome::Unimplemented { .. } => {
                let parcel_id = card.parcel_id()?;
                self.store
                    .get(parcel_id)
                    .await?
                    .ok_or(ParcelError::NotFound(parcel_id))?
            }
        };
        self.job_cards.write().await.insert(parcel.identifier(), card.clone());
        Ok(StatusElement::new(&parcel, Some(card)))
    }

    async fn record(&self, parcel: &ResilienceParcel) {
        if !self.audit.write_audit_entry(parcel, self.synchronous_audit).await {
            warn!(parcel = %parcel.identifier(), "audit trail entry not recorded");
        }
    }
}
