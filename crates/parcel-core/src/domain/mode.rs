//! Deployment modes and the reconciliation policy matrix.
//!
//! Each node runs under a resilience mode (how parcel state is shared) and a
//! concurrency mode (how many members may work the same pipeline stage).
//! `DeploymentModes::policy` is the single place that decides whether a
//! job-card synchronization actually reconciles state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParcelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResilienceMode {
    Standalone,
    Clustered,
    Multisite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyMode {
    Standalone,
    Ondemand,
    Concurrent,
}

impl ResilienceMode {
    pub const ALL: [ResilienceMode; 3] = [
        ResilienceMode::Standalone,
        ResilienceMode::Clustered,
        ResilienceMode::Multisite,
    ];

    /// Parcel state must be visible to other members.
    pub fn requires_replication(self) -> bool {
        !matches!(self, ResilienceMode::Standalone)
    }
}

impl ConcurrencyMode {
    pub const ALL: [ConcurrencyMode; 3] = [
        ConcurrencyMode::Standalone,
        ConcurrencyMode::Ondemand,
        ConcurrencyMode::Concurrent,
    ];
}

impl fmt::Display for ResilienceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResilienceMode::Standalone => "standalone",
            ResilienceMode::Clustered => "clustered",
            ResilienceMode::Multisite => "multisite",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConcurrencyMode::Standalone => "standalone",
            ConcurrencyMode::Ondemand => "ondemand",
            ConcurrencyMode::Concurrent => "concurrent",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ResilienceMode {
    type Err = ParcelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standalone" => Ok(ResilienceMode::Standalone),
            "clustered" => Ok(ResilienceMode::Clustered),
            "multisite" | "multi_site" | "multi-site" => Ok(ResilienceMode::Multisite),
            other => Err(ParcelError::invalid_argument(format!(
                "unknown resilience mode {other:?}"
            ))),
        }
    }
}

impl FromStr for ConcurrencyMode {
    type Err = ParcelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standalone" => Ok(ConcurrencyMode::Standalone),
            "ondemand" | "on_demand" | "on-demand" => Ok(ConcurrencyMode::Ondemand),
            "concurrent" => Ok(ConcurrencyMode::Concurrent),
            other => Err(ParcelError::invalid_argument(format!(
                "unknown concurrency mode {other:?}"
            ))),
        }
    }
}

/// Matrix cell for a (resilience, concurrency) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeTopology {
    /// STANDALONE x STANDALONE.
    SingleNode,
    /// CLUSTERED x STANDALONE: single writer, wasteful.
    Degraded,
    /// CLUSTERED x ONDEMAND.
    Preferred,
    /// MULTISITE x ONDEMAND.
    PreferredScalable,
    /// MULTISITE x CONCURRENT.
    ActiveActive,
    NotSupported,
}

/// What a synchronization does under a given deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationPolicy {
    Reconcile,
    /// Accepted and logged, no state mutation.
    NoOp(ModeTopology),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentModes {
    pub resilience: ResilienceMode,
    pub concurrency: ConcurrencyMode,
}

impl DeploymentModes {
    pub fn new(resilience: ResilienceMode, concurrency: ConcurrencyMode) -> Self {
        Self {
            resilience,
            concurrency,
        }
    }

    pub fn standalone() -> Self {
        Self::new(ResilienceMode::Standalone, ConcurrencyMode::Standalone)
    }

    pub fn topology(&self) -> ModeTopology {
        use ConcurrencyMode as C;
        use ResilienceMode as R;
        match (self.resilience, self.concurrency) {
            (R::Standalone, C::Standalone) => ModeTopology::SingleNode,
            (R::Standalone, C::Ondemand | C::Concurrent) => ModeTopology::NotSupported,
            (R::Clustered, C::Standalone) => ModeTopology::Degraded,
            (R::Clustered, C::Ondemand) => ModeTopology::Preferred,
            (R::Clustered, C::Concurrent) => ModeTopology::NotSupported,
            (R::Multisite, C::Standalone) => ModeTopology::NotSupported,
            (R::Multisite, C::Ondemand) => ModeTopology::PreferredScalable,
            (R::Multisite, C::Concurrent) => ModeTopology::ActiveActive,
        }
    }

    /// Only the single-node cell reconciles; every other cell is a named no-op.
    pub fn policy(&self) -> ReconciliationPolicy {
        match self.topology() {
            ModeTopology::SingleNode => ReconciliationPolicy::Reconcile,
            other => ReconciliationPolicy::NoOp(other),
        }
    }
}

impl Default for DeploymentModes {
    fn default() -> Self {
        Self::standalone()
    }
}

impl fmt::Display for DeploymentModes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.resilience, self.concurrency)
    }
}
