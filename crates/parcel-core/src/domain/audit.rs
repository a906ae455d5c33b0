//! Audit-trail entries: immutable parcel snapshots for external record keeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AuditEntryId, EpisodeId, ParcelId, UnitOfWorkId};
use super::names::{PayloadType, WorkerId};
use super::parcel::ResilienceParcel;
use super::status::{FinalisationStatus, ProcessingStatus};

/// Snapshot of a parcel at `recorded_at`.
///
/// `entry_id` identifies the snapshot itself, so the same parcel can be
/// audited many times and the async queue can remove exactly the entry it
/// wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditTrailEntry {
    pub entry_id: AuditEntryId,
    pub parcel_id: ParcelId,
    pub episode_id: EpisodeId,
    pub worker: WorkerId,
    pub payload_type: PayloadType,
    pub unit_of_work_id: UnitOfWorkId,
    pub processing_status: ProcessingStatus,
    pub finalisation_status: FinalisationStatus,
    pub registered_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub finalised_at: Option<DateTime<Utc>>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditTrailEntry {
    pub fn snapshot(entry_id: AuditEntryId, parcel: &ResilienceParcel, recorded_at: DateTime<Utc>) -> Self {
        Self {
            entry_id,
            parcel_id: parcel.identifier(),
            episode_id: parcel.episode_identifier(),
            worker: parcel.associated_worker_identifier().clone(),
            payload_type: parcel.unit_of_work().payload_type.clone(),
            unit_of_work_id: parcel.unit_of_work().id,
            processing_status: parcel.processing_status(),
            finalisation_status: parcel.finalisation_status(),
            registered_at: parcel.registered_at(),
            started_at: parcel.started_at(),
            finished_at: parcel.finished_at(),
            finalised_at: parcel.finalised_at(),
            recorded_at,
        }
    }
}
