use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::service::ResilienceService;
use crate::domain::{ActivityStatus, JobCardRequest, StatusElement, UnitOfWork};
use crate::error::ParcelError;

/// Result of executing one unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityOutcome {
    Finished,
    Failed(String),
    Cancelled(String),
}

/// Capability a pipeline stage implements to be driven by a `WorkerGroup`.
#[async_trait]
pub trait ActivityWorker: Send + Sync {
    /// Worker function name, e.g. "ingest".
    fn function(&self) -> &str;

    async fn submit_activity(&self, unit_of_work: &UnitOfWork) -> ActivityOutcome;

    /// Called with the final status element, before any purge.
    async fn notify_outcome(&self, _status: &StatusElement) {}
}

/// Per-group tally returned by `shutdown_and_join`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub finished: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub errors: usize,
}

impl WorkerReport {
    fn merge(&mut self, other: &WorkerReport) {
        self.finished += other.finished;
        self.failed += other.failed;
        self.cancelled += other.cancelled;
        self.errors += other.errors;
    }
}

/// Worker group handle.
/// - workers share one unit-of-work channel; closing the sender drains and stops them
/// - `shutdown_and_join()` stops them after their in-flight unit
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<WorkerReport>>,
}

/// One worker instance: its id and the stage it runs.
pub struct WorkerSlot {
    pub instance: String,
    pub worker: Arc<dyn ActivityWorker>,
}

impl WorkerGroup {
    /// Spawn one task per slot. With `purge` set, each parcel is purged once
    /// it is finalised.
    pub fn spawn(
        service: Arc<ResilienceService>,
        slots: Vec<WorkerSlot>,
        units: mpsc::Receiver<UnitOfWork>,
        purge: bool,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let units = Arc::new(Mutex::new(units));

        let joins = slots
            .into_iter()
            .map(|slot| {
                let service = Arc::clone(&service);
                let units = Arc::clone(&units);
                let mut rx = shutdown_rx.clone();
                tokio::spawn(async move { worker_loop(slot, service, units, purge, &mut rx).await })
            })
            .collect();

        Self { shutdown_tx, joins }
    }

    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for the workers to run out of input (sender dropped).
    pub async fn join(self) -> WorkerReport {
        let mut report = WorkerReport::default();
        for j in self.joins {
            match j.await {
                Ok(r) => report.merge(&r),
                Err(e) => {
                    warn!(error = %e, "worker task panicked");
                    report.errors += 1;
                }
            }
        }
        report
    }

    pub async fn shutdown_and_join(self) -> WorkerReport {
        self.request_shutdown();
        self.join().await
    }
}

async fn worker_loop(
    slot: WorkerSlot,
    service: Arc<ResilienceService>,
    units: Arc<Mutex<mpsc::Receiver<UnitOfWork>>>,
    purge: bool,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> WorkerReport {
    let mut report = WorkerReport::default();
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let unit = tokio::select! {
            changed = shutdown_rx.changed() => {
                // handle が drop された
                if changed.is_err() {
                    break;
                }
                continue;
            }
            unit = async { units.lock().await.recv().await } => unit,
        };
        let Some(unit) = unit else {
            // sender 側が閉じた
            break;
        };

        match run_activity(&slot, &service, &unit, purge).await {
            Ok(ActivityOutcome::Finished) => report.finished += 1,
            Ok(ActivityOutcome::Failed(_)) => report.failed += 1,
            Ok(ActivityOutcome::Cancelled(_)) => report.cancelled += 1,
            Err(err) => {
                warn!(worker = %slot.instance, unit_of_work = %unit.id(), error = %err, "activity aborted");
                report.errors += 1;
            }
        }
    }
    debug!(worker = %slot.instance, ?report, "worker stopped");
    report
}

/// register → start → execute → finish / failure / cancellation → finalise (→ purge)
async fn run_activity(
    slot: &WorkerSlot,
    service: &ResilienceService,
    unit: &UnitOfWork,
    purge: bool,
) -> Result<ActivityOutcome, ParcelError> {
    let request = JobCardRequest::new(slot.worker.function(), slot.instance.as_str());
    let registered = service.register_activity(request, unit).await?;
    let card = registered
        .job_card
        .ok_or_else(|| ParcelError::invalid_argument("registration returned no job card"))?;

    let started = service.notify_start(card.clone()).await?;
    let mut card = started.job_card.unwrap_or(card);

    let outcome = slot.worker.submit_activity(unit).await;
    let status = match &outcome {
        ActivityOutcome::Finished => {
            card.current_status = ActivityStatus::Finished;
            service.notify_finish(card).await?
        }
        ActivityOutcome::Failed(reason) => {
            debug!(worker = %slot.instance, %reason, "activity failed");
            let failed = service.notify_failure(card.clone()).await?;
            service.notify_finalisation(failed.job_card.unwrap_or(card)).await?
        }
        ActivityOutcome::Cancelled(reason) => {
            debug!(worker = %slot.instance, %reason, "activity cancelled");
            let cancelled = service.notify_cancellation(card.clone()).await?;
            service
                .notify_finalisation(cancelled.job_card.unwrap_or(card))
                .await?
        }
    };
    slot.worker.notify_outcome(&status).await;

    if purge && let Some(card) = status.job_card {
        service.notify_purge(card).await?;
    }
    Ok(outcome)
}
