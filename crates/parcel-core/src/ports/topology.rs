//! NodeTopology port - worker ごとのデプロイモード

use crate::domain::{DeploymentModes, WorkerId};

pub trait NodeTopology: Send + Sync {
    fn modes_for(&self, worker: &WorkerId) -> DeploymentModes;
}
