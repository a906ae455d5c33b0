//! ResilienceParcel: one processing attempt of a unit of work at one worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{EpisodeId, ParcelId};
use super::names::{WorkerFunction, WorkerId};
use super::status::{FinalisationStatus, ProcessingStatus};
use super::unit_of_work::UnitOfWorkRef;
use crate::error::ParcelError;

/// Design:
/// - The store is the single source of truth; callers hold clones.
/// - All status changes go through `transition`, which enforces the state
///   machine in `ProcessingStatus::can_transition_to`.
/// - Each timestamp is written exactly once and never goes backwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResilienceParcel {
    identifier: ParcelId,
    episode_identifier: EpisodeId,
    associated_worker_identifier: WorkerId,
    worker_function: WorkerFunction,
    processing_status: ProcessingStatus,
    finalisation_status: FinalisationStatus,
    unit_of_work: UnitOfWorkRef,

    registered_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    finalised_at: Option<DateTime<Utc>>,
}

impl ResilienceParcel {
    /// Create a parcel in REGISTERED.
    pub fn register(
        identifier: ParcelId,
        episode_identifier: EpisodeId,
        associated_worker_identifier: WorkerId,
        worker_function: WorkerFunction,
        unit_of_work: UnitOfWorkRef,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            identifier,
            episode_identifier,
            associated_worker_identifier,
            worker_function,
            processing_status: ProcessingStatus::Registered,
            finalisation_status: FinalisationStatus::NotFinalised,
            unit_of_work,
            registered_at: now,
            started_at: None,
            finished_at: None,
            finalised_at: None,
        }
    }

    pub fn identifier(&self) -> ParcelId {
        self.identifier
    }

    pub fn episode_identifier(&self) -> EpisodeId {
        self.episode_identifier
    }

    pub fn associated_worker_identifier(&self) -> &WorkerId {
        &self.associated_worker_identifier
    }

    pub fn worker_function(&self) -> &WorkerFunction {
        &self.worker_function
    }

    pub fn processing_status(&self) -> ProcessingStatus {
        self.processing_status
    }

    pub fn finalisation_status(&self) -> FinalisationStatus {
        self.finalisation_status
    }

    pub fn unit_of_work(&self) -> &UnitOfWorkRef {
        &self.unit_of_work
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn finalised_at(&self) -> Option<DateTime<Utc>> {
        self.finalised_at
    }

    pub fn is_finalised(&self) -> bool {
        self.finalisation_status == FinalisationStatus::Finalised
    }

    /// Move to `to`, stamping the matching timestamp.
    ///
    /// FINISHED, FAILED and CANCELLED all stamp `finished_at` (the attempt is
    /// over); FINALISED stamps `finalised_at` and flips the finalisation status.
    pub fn transition(&mut self, to: ProcessingStatus, now: DateTime<Utc>) -> Result<(), ParcelError> {
        if !self.processing_status.can_transition_to(to) {
            return Err(ParcelError::InvalidTransition {
                parcel: self.identifier,
                from: self.processing_status,
                to,
            });
        }
        let at = self.monotonic(now);
        match to {
            ProcessingStatus::Active => {
                self.started_at.get_or_insert(at);
            }
            ProcessingStatus::Finished | ProcessingStatus::Failed | ProcessingStatus::Cancelled => {
                self.finished_at.get_or_insert(at);
            }
            ProcessingStatus::Finalised => {
                self.finalised_at.get_or_insert(at);
                self.finalisation_status = FinalisationStatus::Finalised;
            }
            ProcessingStatus::Registered | ProcessingStatus::Initiated => {}
        }
        self.processing_status = to;
        Ok(())
    }

    /// REGISTERED -> INITIATED -> ACTIVE (from wherever the parcel currently is).
    pub fn activate(&mut self, now: DateTime<Utc>) -> Result<(), ParcelError> {
        if self.processing_status == ProcessingStatus::Registered {
            self.transition(ProcessingStatus::Initiated, now)?;
        }
        self.transition(ProcessingStatus::Active, now)
    }

    /// ACTIVE -> FINISHED -> FINALISED.
    pub fn finish_and_finalise(&mut self, now: DateTime<Utc>) -> Result<(), ParcelError> {
        if self.processing_status != ProcessingStatus::Finished {
            self.transition(ProcessingStatus::Finished, now)?;
        }
        self.transition(ProcessingStatus::Finalised, now)
    }

    fn monotonic(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        [self.started_at, self.finished_at, self.finalised_at]
            .into_iter()
            .flatten()
            .fold(now.max(self.registered_at), DateTime::max)
    }
}
