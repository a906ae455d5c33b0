//! Node configuration loaded from `parcel.toml`.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! `PARCEL_*` environment variables take precedence over the file.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ConcurrencyMode, DeploymentModes, ResilienceMode, WorkerId};
use crate::error::ParcelError;
use crate::impls::StaticTopology;
use crate::queue::RetryPolicy;

pub const ENV_RESILIENCE_MODE: &str = "PARCEL_RESILIENCE_MODE";
pub const ENV_CONCURRENCY_MODE: &str = "PARCEL_CONCURRENCY_MODE";
pub const ENV_AUDIT_SYNCHRONOUS: &str = "PARCEL_AUDIT_SYNCHRONOUS";
pub const ENV_MEMBER_NAME: &str = "PARCEL_MEMBER_NAME";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {source}")]
    Env {
        key: &'static str,
        #[source]
        source: ParcelError,
    },

    #[error("invalid worker override: {0}")]
    Worker(#[source] ParcelError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub node: NodeConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub resilience_mode: ResilienceMode,
    pub concurrency_mode: ConcurrencyMode,

    /// Name this node uses as a cluster member.
    pub member_name: String,

    /// Per-worker mode overrides, keyed by worker id.
    pub workers: BTreeMap<String, WorkerModes>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkerModes {
    pub resilience_mode: ResilienceMode,
    pub concurrency_mode: ConcurrencyMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Write audit entries inline instead of through the queue.
    pub synchronous: bool,
    pub poll_interval_ms: u64,
    pub retry_base_delay_ms: u64,
    pub retry_multiplier: f64,
    pub retry_max_delay_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            resilience_mode: ResilienceMode::Standalone,
            concurrency_mode: ConcurrencyMode::Standalone,
            member_name: "node-1".to_string(),
            workers: BTreeMap::new(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            synchronous: false,
            poll_interval_ms: 500,
            retry_base_delay_ms: 100,
            retry_multiplier: 2.0,
            retry_max_delay_ms: 5_000,
        }
    }
}

impl ResilienceConfig {
    /// Read `path` if given (a missing file means defaults), then apply the
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_toml_str(&std::fs::read_to_string(path)?)?,
            _ => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Empty values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(raw) = get(ENV_RESILIENCE_MODE) {
            self.node.resilience_mode = raw.parse().map_err(|source| ConfigError::Env {
                key: ENV_RESILIENCE_MODE,
                source,
            })?;
        }
        if let Some(raw) = get(ENV_CONCURRENCY_MODE) {
            self.node.concurrency_mode = raw.parse().map_err(|source| ConfigError::Env {
                key: ENV_CONCURRENCY_MODE,
                source,
            })?;
        }
        if let Some(raw) = get(ENV_AUDIT_SYNCHRONOUS) {
            self.audit.synchronous = parse_flag(&raw).ok_or_else(|| ConfigError::Env {
                key: ENV_AUDIT_SYNCHRONOUS,
                source: ParcelError::invalid_argument(format!("expected a boolean, got {raw:?}")),
            })?;
        }
        if let Some(raw) = get(ENV_MEMBER_NAME) {
            self.node.member_name = raw.trim().to_string();
        }
        Ok(())
    }

    pub fn node_modes(&self) -> DeploymentModes {
        DeploymentModes::new(self.node.resilience_mode, self.node.concurrency_mode)
    }

    pub fn topology(&self) -> Result<StaticTopology, ConfigError> {
        let mut topology = StaticTopology::new(self.node_modes());
        for (worker, modes) in &self.node.workers {
            let worker = WorkerId::parse(worker).map_err(ConfigError::Worker)?;
            topology = topology.with_override(
                worker,
                DeploymentModes::new(modes.resilience_mode, modes.concurrency_mode),
            );
        }
        Ok(topology)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.audit.retry_base_delay_ms),
            multiplier: self.audit.retry_multiplier,
            max_delay: Duration::from_millis(self.audit.retry_max_delay_ms),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.audit.poll_interval_ms)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
