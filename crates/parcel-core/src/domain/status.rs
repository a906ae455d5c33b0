//! Parcel and job-card status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Processing status of a parcel.
///
/// State transitions:
/// - Registered -> Initiated -> Active -> Finished -> Finalised
/// - Registered | Initiated | Active -> Failed -> Finalised
/// - Registered | Initiated | Active -> Cancelled -> Finalised
///
/// Purge removes a parcel in any status; it is not a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Registered,
    Initiated,
    Active,
    Finished,
    Failed,
    Cancelled,
    Finalised,
}

impl ProcessingStatus {
    pub const ALL: [ProcessingStatus; 7] = [
        ProcessingStatus::Registered,
        ProcessingStatus::Initiated,
        ProcessingStatus::Active,
        ProcessingStatus::Finished,
        ProcessingStatus::Failed,
        ProcessingStatus::Cancelled,
        ProcessingStatus::Finalised,
    ];

    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        matches!(
            (self, to),
            (Registered, Initiated)
                | (Initiated, Active)
                | (Active, Finished)
                | (Registered | Initiated | Active, Failed)
                | (Registered | Initiated | Active, Cancelled)
                | (Finished | Failed | Cancelled, Finalised)
        )
    }

    /// REGISTERED, INITIATED or ACTIVE.
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            ProcessingStatus::Registered | ProcessingStatus::Initiated | ProcessingStatus::Active
        )
    }

    /// No further transitions (only purge).
    pub fn is_terminal(self) -> bool {
        self == ProcessingStatus::Finalised
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessingStatus::Registered => "registered",
            ProcessingStatus::Initiated => "initiated",
            ProcessingStatus::Active => "active",
            ProcessingStatus::Finished => "finished",
            ProcessingStatus::Failed => "failed",
            ProcessingStatus::Cancelled => "cancelled",
            ProcessingStatus::Finalised => "finalised",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalisationStatus {
    NotFinalised,
    Finalised,
}

/// Status carried on a job card (requested / granted / current).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Waiting,
    Executing,
    Finished,
    Failed,
    Cancelled,
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActivityStatus::Waiting => "waiting",
            ActivityStatus::Executing => "executing",
            ActivityStatus::Finished => "finished",
            ActivityStatus::Failed => "failed",
            ActivityStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}
