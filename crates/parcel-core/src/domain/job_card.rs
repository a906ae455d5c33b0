//! Job cards: the token a worker holds for one activity attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{EpisodeId, ParcelId};
use super::mode::{ConcurrencyMode, DeploymentModes, ResilienceMode};
use super::names::{WorkerFunction, WorkerId};
use super::status::ActivityStatus;
use crate::error::ParcelError;

/// One link in the pipeline continuity chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLink {
    pub parcel: ParcelId,
    pub episode: EpisodeId,
    pub worker_function: WorkerFunction,
    pub worker: WorkerId,
}

/// Continuity record: the present attempt and the attempt that handed it the
/// unit of work (absent for the first stage).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityId {
    pub previous: Option<ActivityLink>,
    pub present: ActivityLink,
    pub created_at: DateTime<Utc>,
}

/// Concurrency-control token for one activity attempt.
///
/// Workers set `requested_status` / `current_status`; everything else is
/// written by the synchronizer. `activity_id` is optional because cards
/// arrive from the transport layer and may be incomplete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCard {
    pub activity_id: Option<ActivityId>,
    pub requested_status: ActivityStatus,
    pub granted_status: ActivityStatus,
    pub current_status: ActivityStatus,
    pub cluster_mode: ConcurrencyMode,
    pub system_mode: ResilienceMode,
    pub to_be_discarded: bool,
    pub update_date: DateTime<Utc>,
}

impl JobCard {
    /// Fresh card: everything WAITING.
    pub fn new(activity_id: ActivityId, modes: DeploymentModes, now: DateTime<Utc>) -> Self {
        Self {
            activity_id: Some(activity_id),
            requested_status: ActivityStatus::Waiting,
            granted_status: ActivityStatus::Waiting,
            current_status: ActivityStatus::Waiting,
            cluster_mode: modes.concurrency,
            system_mode: modes.resilience,
            to_be_discarded: false,
            update_date: now,
        }
    }

    /// The present link, or `InvalidArgument` when the card has none.
    pub fn present(&self) -> Result<&ActivityLink, ParcelError> {
        self.activity_id
            .as_ref()
            .map(|id| &id.present)
            .ok_or_else(|| ParcelError::invalid_argument("job card has no activity identifier"))
    }

    pub fn parcel_id(&self) -> Result<ParcelId, ParcelError> {
        self.present().map(|link| link.parcel)
    }

    pub fn modes(&self) -> DeploymentModes {
        DeploymentModes::new(self.system_mode, self.cluster_mode)
    }

    /// The link a downstream stage passes as `previous`.
    pub fn handover(&self) -> Result<ActivityLink, ParcelError> {
        self.present().cloned()
    }
}

/// What a worker submits to register a new activity.
#[derive(Debug, Clone, Default)]
pub struct JobCardRequest {
    pub worker_function: String,
    pub worker_instance: String,
    pub episode: Option<EpisodeId>,
    pub previous: Option<ActivityLink>,
}

impl JobCardRequest {
    pub fn new(worker_function: impl Into<String>, worker_instance: impl Into<String>) -> Self {
        Self {
            worker_function: worker_function.into(),
            worker_instance: worker_instance.into(),
            episode: None,
            previous: None,
        }
    }

    pub fn episode(mut self, episode: EpisodeId) -> Self {
        self.episode = Some(episode);
        self
    }

    pub fn previous(mut self, previous: ActivityLink) -> Self {
        self.previous = Some(previous);
        self
    }

    /// Explicit episode, else the predecessor's episode, else none (caller
    /// opens a new one).
    pub fn resolved_episode(&self) -> Option<EpisodeId> {
        self.episode
            .or_else(|| self.previous.as_ref().map(|link| link.episode))
    }
}
