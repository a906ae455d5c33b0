//! Domain model (IDs, names, statuses, parcels, job cards, audit entries).

pub mod audit;
pub mod ids;
pub mod job_card;
pub mod mode;
pub mod names;
pub mod parcel;
pub mod status;
pub mod status_element;
pub mod unit_of_work;

pub use audit::AuditTrailEntry;
pub use ids::{AuditEntryId, EpisodeId, ParcelId, UnitOfWorkId};
pub use job_card::{ActivityId, ActivityLink, JobCard, JobCardRequest};
pub use mode::{ConcurrencyMode, DeploymentModes, ModeTopology, ReconciliationPolicy, ResilienceMode};
pub use names::{PayloadType, WorkerFunction, WorkerId};
pub use parcel::ResilienceParcel;
pub use status::{ActivityStatus, FinalisationStatus, ProcessingStatus};
pub use status_element::StatusElement;
pub use unit_of_work::{Payload, UnitOfWork, UnitOfWorkRef};
