//! ServiceBuilder - ResilienceService の構築とワイヤリング
//!
//! # Fail-fast
//! - 監査シンクが無ければ MissingAuditSink
//! - Clustered / Multisite のモードがあるのに複製されないストアなら StoreNotReplicated
//! - 設定の worker 上書きが不正なら InvalidConfig
//!
//! # 使用例
//! ```ignore
//! let service = ServiceBuilder::new(ResilienceConfig::load(None)?)
//!     .audit_sink(Arc::new(TracingAuditSink))
//!     .build()?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::audit_writer::AuditWriter;
use super::service::ResilienceService;
use super::subscriptions::TopicSubscriptionRegistry;
use super::synchronizer::ActivitySynchronizer;
use crate::config::{ConfigError, ResilienceConfig};
use crate::domain::DeploymentModes;
use crate::impls::LocalParcelStore;
use crate::ports::{AuditSink, Clock, IdGenerator, NodeTopology, ParcelStore, SystemClock, UlidGenerator};
use crate::queue::AsynchronousAuditQueue;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no audit sink configured")]
    MissingAuditSink,

    #[error("deployment {0} requires a replicated parcel store, but the configured store is node-local")]
    StoreNotReplicated(DeploymentModes),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

pub struct ServiceBuilder {
    config: ResilienceConfig,
    store: Option<Arc<dyn ParcelStore>>,
    sink: Option<Arc<dyn AuditSink>>,
    topology: Option<Arc<dyn NodeTopology>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl ServiceBuilder {
    pub fn new(config: ResilienceConfig) -> Self {
        Self {
            config,
            store: None,
            sink: None,
            topology: None,
            clock: None,
            ids: None,
        }
    }

    /// 省略時は LocalParcelStore
    pub fn store(mut self, store: Arc<dyn ParcelStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 省略時は設定から StaticTopology を作る。
    ///
    /// 明示した場合、複製チェックは設定のモードに対して行う。
    pub fn topology(mut self, topology: Arc<dyn NodeTopology>) -> Self {
        self.topology = Some(topology);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> Result<ResilienceService, BuildError> {
        let sink = self.sink.ok_or(BuildError::MissingAuditSink)?;

        let (topology, modes): (Arc<dyn NodeTopology>, Vec<DeploymentModes>) = match self.topology {
            Some(topology) => (topology, vec![self.config.node_modes()]),
            None => {
                let topology = self.config.topology()?;
                let modes = topology.all_modes();
                let topology: Arc<dyn NodeTopology> = Arc::new(topology);
                (topology, modes)
            }
        };

        let store: Arc<dyn ParcelStore> = match self.store {
            Some(store) => store,
            None => Arc::new(LocalParcelStore::new()),
        };
        if !store.is_replicated()
            && let Some(modes) = modes.into_iter().find(|m| m.resilience.requires_replication())
        {
            return Err(BuildError::StoreNotReplicated(modes));
        }

        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(Arc::clone(&clock))),
        };
        let queue = Arc::new(AsynchronousAuditQueue::new());

        Ok(ResilienceService {
            synchronizer: ActivitySynchronizer::new(Arc::clone(&store), Arc::clone(&topology), Arc::clone(&clock)),
            audit: AuditWriter::new(
                Arc::clone(&sink),
                Arc::clone(&queue),
                Arc::clone(&ids),
                Arc::clone(&clock),
            ),
            subscriptions: TopicSubscriptionRegistry::new(),
            job_cards: RwLock::new(HashMap::new()),
            registration: Mutex::new(()),
            synchronous_audit: self.config.audit.synchronous,
            retry: self.config.retry_policy(),
            poll_interval: self.config.poll_interval(),
            store,
            topology,
            sink,
            queue,
            ids,
            clock,
        })
    }
}
