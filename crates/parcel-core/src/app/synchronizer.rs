//! ActivitySynchronizer - job card と parcel の突き合わせ
//!
//! # 流れ
//! 1. job card の activity id を検証（無ければ InvalidArgument、何も変えない）
//! 2. worker のノードのデプロイモードからポリシーを決める
//!    - STANDALONE×STANDALONE 以外は NoOp（ログを出して card をそのまま返す）
//! 3. parcel を正本から読み、遷移を適用して書き戻す
//!
//! 同時更新は last-write-wins（ロックは取らない）。

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::{
    ActivityStatus, DeploymentModes, JobCard, ModeTopology, ProcessingStatus, ReconciliationPolicy,
    ResilienceParcel,
};
use crate::error::ParcelError;
use crate::ports::{Clock, NodeTopology, ParcelStore};

/// worker から届く通知の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    Finish,
    Failure,
    Cancellation,
    Finalisation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// 状態を反映した。`parcel` は書き戻した後の値。
    Reconciled { parcel: ResilienceParcel },
    /// このモードの組み合わせでは突き合わせを行わない（状態は不変）。
    Unimplemented {
        modes: DeploymentModes,
        topology: ModeTopology,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Synchronized {
    pub card: JobCard,
    pub outcome: SyncOutcome,
}

pub struct ActivitySynchronizer {
    store: Arc<dyn ParcelStore>,
    topology: Arc<dyn NodeTopology>,
    clock: Arc<dyn Clock>,
}

impl ActivitySynchronizer {
    pub fn new(store: Arc<dyn ParcelStore>, topology: Arc<dyn NodeTopology>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            topology,
            clock,
        }
    }

    pub async fn synchronize(&self, mut card: JobCard, transition: Transition) -> Result<Synchronized, ParcelError> {
        let present = card.present()?.clone();
        let modes = self.topology.modes_for(&present.worker);

        if let ReconciliationPolicy::NoOp(topology) = modes.policy() {
            if topology == ModeTopology::NotSupported {
                warn!(
                    parcel = %present.parcel,
                    worker = %present.worker,
                    modes = %modes,
                    ?transition,
                    "unsupported mode combination, job card left as submitted"
                );
            } else {
                info!(
                    parcel = %present.parcel,
                    worker = %present.worker,
                    modes = %modes,
                    ?topology,
                    ?transition,
                    "reconciliation not implemented for this topology, job card left as submitted"
                );
            }
            return Ok(Synchronized {
                card,
                outcome: SyncOutcome::Unimplemented { modes, topology },
            });
        }

        let mut parcel = self
            .store
            .get(present.parcel)
            .await?
            .ok_or(ParcelError::NotFound(present.parcel))?;
        let now = self.clock.now();
        let from = parcel.processing_status();

        if transition == Transition::Finalisation && parcel.is_finalised() {
            debug!(parcel = %present.parcel, "already finalised");
            card.update_date = now;
            return Ok(Synchronized {
                card,
                outcome: SyncOutcome::Reconciled { parcel },
            });
        }

        match transition {
            Transition::Start => {
                parcel.activate(now)?;
                card.current_status = ActivityStatus::Executing;
                card.granted_status = ActivityStatus::Executing;
            }
            Transition::Finish => {
                card.granted_status = card.current_status;
                if card.current_status == ActivityStatus::Finished {
                    parcel.finish_and_finalise(now)?;
                } else if from == ProcessingStatus::Failed {
                    // notify_failure の後の finish。既に FAILED なのでそのまま
                    debug!(parcel = %present.parcel, "already failed");
                } else {
                    parcel.transition(ProcessingStatus::Failed, now)?;
                }
            }
            Transition::Failure => {
                parcel.transition(ProcessingStatus::Failed, now)?;
                card.current_status = ActivityStatus::Failed;
                card.granted_status = ActivityStatus::Failed;
            }
            Transition::Cancellation => {
                parcel.transition(ProcessingStatus::Cancelled, now)?;
                card.current_status = ActivityStatus::Cancelled;
                card.granted_status = ActivityStatus::Cancelled;
                card.to_be_discarded = true;
            }
            Transition::Finalisation => {
                parcel.transition(ProcessingStatus::Finalised, now)?;
            }
        }
        card.cluster_mode = modes.concurrency;
        card.system_mode = modes.resilience;
        card.update_date = now;

        self.store.update(parcel.clone()).await?;
        info!(
            parcel = %present.parcel,
            episode = %present.episode,
            worker = %present.worker,
            %from,
            to = %parcel.processing_status(),
            granted = %card.granted_status,
            "parcel synchronized"
        );

        Ok(Synchronized {
            card,
            outcome: SyncOutcome::Reconciled { parcel },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ActivityId, ActivityLink, ConcurrencyMode, EpisodeId, FinalisationStatus, ParcelId, PayloadType,
        ResilienceMode, UnitOfWorkId, UnitOfWorkRef, WorkerFunction, WorkerId,
    };
    use crate::impls::{LocalParcelStore, StaticTopology};
    use crate::ports::FixedClock;
    use chrono::{Duration, TimeZone, Utc};
    use rstest::rstest;
    use ulid::Ulid;

    struct Fixture {
        store: Arc<LocalParcelStore>,
        clock: Arc<FixedClock>,
        sync: ActivitySynchronizer,
    }

    fn fixture(modes: DeploymentModes) -> Fixture {
        let store = Arc::new(LocalParcelStore::new());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let sync = ActivitySynchronizer::new(store.clone(), Arc::new(StaticTopology::new(modes)), clock.clone());
        Fixture { store, clock, sync }
    }

    async fn registered(f: &Fixture) -> (ResilienceParcel, JobCard) {
        let parcel = ResilienceParcel::register(
            ParcelId::from_ulid(Ulid::new()),
            EpisodeId::from_ulid(Ulid::new()),
            WorkerId::parse("w1").unwrap(),
            WorkerFunction::parse("ingest").unwrap(),
            UnitOfWorkRef {
                id: UnitOfWorkId::from_ulid(Ulid::new()),
                payload_type: PayloadType::parse("test.shipment.v1").unwrap(),
            },
            f.clock.now(),
        );
        f.store.add(parcel.clone()).await.unwrap();
        let card = JobCard::new(
            ActivityId {
                previous: None,
                present: ActivityLink {
                    parcel: parcel.identifier(),
                    episode: parcel.episode_identifier(),
                    worker_function: parcel.worker_function().clone(),
                    worker: parcel.associated_worker_identifier().clone(),
                },
                created_at: f.clock.now(),
            },
            DeploymentModes::standalone(),
            f.clock.now(),
        );
        (parcel, card)
    }

    fn reconciled(s: &Synchronized) -> &ResilienceParcel {
        match &s.outcome {
            SyncOutcome::Reconciled { parcel } => parcel,
            other => panic!("expected reconciliation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn finish_with_finished_current_finalises() {
        let f = fixture(DeploymentModes::standalone());
        let (parcel, card) = registered(&f).await;
        let started = f.sync.synchronize(card, Transition::Start).await.unwrap();

        f.clock.advance(Duration::seconds(3));
        let mut card = started.card;
        card.current_status = ActivityStatus::Finished;
        let done = f.sync.synchronize(card, Transition::Finish).await.unwrap();

        let stored = f.store.get(parcel.identifier()).await.unwrap().unwrap();
        assert_eq!(reconciled(&done), &stored);
        assert_eq!(stored.processing_status(), ProcessingStatus::Finalised);
        assert_eq!(stored.finalisation_status(), FinalisationStatus::Finalised);
        assert_eq!(stored.finished_at(), Some(f.clock.now()));
        assert_eq!(stored.finalised_at(), Some(f.clock.now()));
        assert_eq!(stored.episode_identifier(), parcel.episode_identifier());
        assert_eq!(done.card.granted_status, ActivityStatus::Finished);
        assert_eq!(done.card.update_date, f.clock.now());
    }

    #[rstest]
    #[case(ActivityStatus::Waiting)]
    #[case(ActivityStatus::Executing)]
    #[case(ActivityStatus::Failed)]
    #[case(ActivityStatus::Cancelled)]
    #[tokio::test]
    async fn finish_with_any_other_current_fails(#[case] current: ActivityStatus) {
        let f = fixture(DeploymentModes::standalone());
        let (parcel, card) = registered(&f).await;
        let mut card = f.sync.synchronize(card, Transition::Start).await.unwrap().card;

        card.current_status = current;
        let done = f.sync.synchronize(card, Transition::Finish).await.unwrap();

        assert_eq!(reconciled(&done).processing_status(), ProcessingStatus::Failed);
        assert_eq!(done.card.granted_status, current);
        let stored = f.store.get(parcel.identifier()).await.unwrap().unwrap();
        assert_eq!(stored.processing_status(), ProcessingStatus::Failed);
        assert!(stored.finished_at().is_some());
    }

    #[rstest]
    #[case(ResilienceMode::Standalone, ConcurrencyMode::Ondemand)]
    #[case(ResilienceMode::Standalone, ConcurrencyMode::Concurrent)]
    #[case(ResilienceMode::Clustered, ConcurrencyMode::Standalone)]
    #[case(ResilienceMode::Clustered, ConcurrencyMode::Ondemand)]
    #[case(ResilienceMode::Clustered, ConcurrencyMode::Concurrent)]
    #[case(ResilienceMode::Multisite, ConcurrencyMode::Standalone)]
    #[case(ResilienceMode::Multisite, ConcurrencyMode::Ondemand)]
    #[case(ResilienceMode::Multisite, ConcurrencyMode::Concurrent)]
    #[tokio::test]
    async fn other_mode_combinations_leave_state_unchanged(
        #[case] resilience: ResilienceMode,
        #[case] concurrency: ConcurrencyMode,
    ) {
        let modes = DeploymentModes::new(resilience, concurrency);
        let f = fixture(modes);
        let (parcel, mut card) = registered(&f).await;
        card.current_status = ActivityStatus::Finished;

        for transition in [
            Transition::Start,
            Transition::Finish,
            Transition::Failure,
            Transition::Cancellation,
            Transition::Finalisation,
        ] {
            let out = f.sync.synchronize(card.clone(), transition).await.unwrap();
            assert_eq!(out.card, card);
            assert_eq!(
                out.outcome,
                SyncOutcome::Unimplemented {
                    modes,
                    topology: modes.topology()
                }
            );
        }
        assert_eq!(f.store.get(parcel.identifier()).await.unwrap(), Some(parcel));
    }

    #[tokio::test]
    async fn missing_activity_id_is_rejected_without_mutation() {
        let f = fixture(DeploymentModes::standalone());
        let (parcel, mut card) = registered(&f).await;
        card.activity_id = None;

        let err = f.sync.synchronize(card, Transition::Start).await.unwrap_err();
        assert!(matches!(err, ParcelError::InvalidArgument(_)));
        assert_eq!(f.store.get(parcel.identifier()).await.unwrap(), Some(parcel));
    }

    #[tokio::test]
    async fn vanished_parcel_is_not_found() {
        let f = fixture(DeploymentModes::standalone());
        let (parcel, card) = registered(&f).await;
        f.store.remove(parcel.identifier()).await.unwrap();

        let err = f.sync.synchronize(card, Transition::Start).await.unwrap_err();
        assert!(matches!(err, ParcelError::NotFound(id) if id == parcel.identifier()));
    }

    #[tokio::test]
    async fn cancellation_marks_card_for_discard() {
        let f = fixture(DeploymentModes::standalone());
        let (parcel, card) = registered(&f).await;

        let out = f.sync.synchronize(card, Transition::Cancellation).await.unwrap();
        assert!(out.card.to_be_discarded);
        assert_eq!(out.card.granted_status, ActivityStatus::Cancelled);
        let stored = f.store.get(parcel.identifier()).await.unwrap().unwrap();
        assert_eq!(stored.processing_status(), ProcessingStatus::Cancelled);

        let out = f.sync.synchronize(out.card, Transition::Finalisation).await.unwrap();
        assert!(reconciled(&out).is_finalised());
        // 二度目の finalise は何もしない
        let again = f.sync.synchronize(out.card, Transition::Finalisation).await.unwrap();
        assert!(reconciled(&again).is_finalised());
    }

    #[tokio::test]
    async fn finish_after_failure_keeps_the_parcel_failed() {
        let f = fixture(DeploymentModes::standalone());
        let (parcel, card) = registered(&f).await;
        let card = f.sync.synchronize(card, Transition::Start).await.unwrap().card;
        let failed = f.sync.synchronize(card, Transition::Failure).await.unwrap();
        let failed_at = reconciled(&failed).finished_at();

        f.clock.advance(Duration::seconds(1));
        let done = f.sync.synchronize(failed.card, Transition::Finish).await.unwrap();

        assert_eq!(reconciled(&done).processing_status(), ProcessingStatus::Failed);
        assert_eq!(done.card.granted_status, ActivityStatus::Failed);
        assert_eq!(done.card.update_date, f.clock.now());
        let stored = f.store.get(parcel.identifier()).await.unwrap().unwrap();
        assert_eq!(stored.processing_status(), ProcessingStatus::Failed);
        assert_eq!(stored.finished_at(), failed_at);
    }

    #[tokio::test]
    async fn finish_before_start_is_an_invalid_transition() {
        let f = fixture(DeploymentModes::standalone());
        let (parcel, mut card) = registered(&f).await;
        card.current_status = ActivityStatus::Finished;

        let err = f.sync.synchronize(card, Transition::Finish).await.unwrap_err();
        assert!(matches!(err, ParcelError::InvalidTransition { .. }));
        assert_eq!(f.store.get(parcel.identifier()).await.unwrap(), Some(parcel));
    }
}
