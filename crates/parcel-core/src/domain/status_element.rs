use serde::{Deserialize, Serialize};

use super::ids::{EpisodeId, ParcelId};
use super::job_card::JobCard;
use super::names::WorkerId;
use super::parcel::ResilienceParcel;
use super::status::{FinalisationStatus, ProcessingStatus};
use super::unit_of_work::UnitOfWorkRef;

/// Status view returned to workers by registration and lifecycle calls.
///
/// `job_card` is `None` when the parcel was registered through another
/// cluster member (job cards are node-local).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusElement {
    pub parcel_id: ParcelId,
    pub episode_id: EpisodeId,
    pub worker: WorkerId,
    pub unit_of_work: UnitOfWorkRef,
    pub processing_status: ProcessingStatus,
    pub finalisation_status: FinalisationStatus,
    pub job_card: Option<JobCard>,
}

impl StatusElement {
    pub fn new(parcel: &ResilienceParcel, job_card: Option<JobCard>) -> Self {
        Self {
            parcel_id: parcel.identifier(),
            episode_id: parcel.episode_identifier(),
            worker: parcel.associated_worker_identifier().clone(),
            unit_of_work: parcel.unit_of_work().clone(),
            processing_status: parcel.processing_status(),
            finalisation_status: parcel.finalisation_status(),
            job_card,
        }
    }
}
