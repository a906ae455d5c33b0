use serde::{Deserialize, Serialize};

use crate::domain::ProcessingStatus;
use crate::error::ParcelError;
use crate::ports::ParcelStore;
use crate::queue::AsynchronousAuditQueue;

/// Point-in-time view of a node: parcels per status plus audit backlog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParcelCounts {
    pub registered: usize,
    pub initiated: usize,
    pub active: usize,
    pub finished: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub finalised: usize,
    pub audit_backlog: usize,
}

impl ParcelCounts {
    pub async fn collect(store: &dyn ParcelStore, queue: &AsynchronousAuditQueue) -> Result<Self, ParcelError> {
        let mut counts = Self {
            audit_backlog: queue.len(),
            ..Self::default()
        };
        for parcel in store.list().await? {
            *counts.slot(parcel.processing_status()) += 1;
        }
        Ok(counts)
    }

    pub fn total(&self) -> usize {
        ProcessingStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }

    pub fn get(&self, status: ProcessingStatus) -> usize {
        match status {
            ProcessingStatus::Registered => self.registered,
            ProcessingStatus::Initiated => self.initiated,
            ProcessingStatus::Active => self.active,
            ProcessingStatus::Finished => self.finished,
            ProcessingStatus::Failed => self.failed,
            ProcessingStatus::Cancelled => self.cancelled,
            ProcessingStatus::Finalised => self.finalised,
        }
    }

    fn slot(&mut self, status: ProcessingStatus) -> &mut usize {
        match status {
            ProcessingStatus::Registered => &mut self.registered,
            ProcessingStatus::Initiated => &mut self.initiated,
            ProcessingStatus::Active => &mut self.active,
            ProcessingStatus::Finished => &mut self.finished,
            ProcessingStatus::Failed => &mut self.failed,
            ProcessingStatus::Cancelled => &mut self.cancelled,
            ProcessingStatus::Finalised => &mut self.finalised,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        EpisodeId, ParcelId, PayloadType, ResilienceParcel, UnitOfWorkId, UnitOfWorkRef, WorkerFunction, WorkerId,
    };
    use crate::impls::LocalParcelStore;
    use chrono::Utc;
    use rstest::rstest;
    use ulid::Ulid;

    fn parcel() -> ResilienceParcel {
        ResilienceParcel::register(
            ParcelId::from_ulid(Ulid::new()),
            EpisodeId::from_ulid(Ulid::new()),
            WorkerId::parse("w1").unwrap(),
            WorkerFunction::parse("ingest").unwrap(),
            UnitOfWorkRef {
                id: UnitOfWorkId::from_ulid(Ulid::new()),
                payload_type: PayloadType::parse("test.shipment.v1").unwrap(),
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn counts_follow_the_store() {
        let store = LocalParcelStore::new();
        let queue = AsynchronousAuditQueue::new();
        let now = Utc::now();

        store.add(parcel()).await.unwrap();
        let mut active = parcel();
        active.activate(now).unwrap();
        store.add(active).await.unwrap();
        let mut failed = parcel();
        failed.transition(ProcessingStatus::Failed, now).unwrap();
        store.add(failed).await.unwrap();

        let counts = ParcelCounts::collect(&store, &queue).await.unwrap();
        assert_eq!(counts.registered, 1);
        assert_eq!(counts.active, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.audit_backlog, 0);
    }

    // list_by_status と件数が一致すること（空の status も含む）
    #[rstest]
    #[case(ProcessingStatus::Registered)]
    #[case(ProcessingStatus::Initiated)]
    #[case(ProcessingStatus::Active)]
    #[case(ProcessingStatus::Finished)]
    #[case(ProcessingStatus::Failed)]
    #[case(ProcessingStatus::Cancelled)]
    #[case(ProcessingStatus::Finalised)]
    #[tokio::test]
    async fn counts_match_list_by_status(#[case] status: ProcessingStatus) {
        let store = LocalParcelStore::new();
        let now = Utc::now();
        let mut a = parcel();
        a.activate(now).unwrap();
        let mut b = parcel();
        b.transition(ProcessingStatus::Cancelled, now).unwrap();
        for p in [parcel(), a, b] {
            store.add(p).await.unwrap();
        }

        let counts = ParcelCounts::collect(&store, &AsynchronousAuditQueue::new()).await.unwrap();
        let listed = store.list_by_status(status).await.unwrap();
        let filtered: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .filter(|p| p.processing_status() == status)
            .collect();
        assert_eq!(listed, filtered);
        assert_eq!(counts.get(status), listed.len());
    }
}
