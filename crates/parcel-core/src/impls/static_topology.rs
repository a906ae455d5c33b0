//! StaticTopology - 設定ファイルから作る固定のノードトポロジー

use std::collections::HashMap;

use crate::domain::{DeploymentModes, WorkerId};
use crate::ports::NodeTopology;

/// ノード既定のモード + worker ごとの上書き
#[derive(Debug, Clone, Default)]
pub struct StaticTopology {
    default: DeploymentModes,
    overrides: HashMap<WorkerId, DeploymentModes>,
}

impl StaticTopology {
    pub fn new(default: DeploymentModes) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, worker: WorkerId, modes: DeploymentModes) -> Self {
        self.overrides.insert(worker, modes);
        self
    }

    pub fn default_modes(&self) -> DeploymentModes {
        self.default
    }

    /// 既定または上書きで使われるモードの一覧（重複なし）
    pub fn all_modes(&self) -> Vec<DeploymentModes> {
        let mut modes = vec![self.default];
        for m in self.overrides.values() {
            if !modes.contains(m) {
                modes.push(*m);
            }
        }
        modes
    }
}

impl NodeTopology for StaticTopology {
    fn modes_for(&self, worker: &WorkerId) -> DeploymentModes {
        self.overrides.get(worker).copied().unwrap_or(self.default)
    }
}
