//! AuditDrainLoop - 非同期監査キューの単一コンシューマ
//!
//! peek → write → remove。失敗したら同じ先頭をバックオフ付きで再送し、
//! 成功するまで次のエントリには進まない（at-least-once、順序維持）。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ports::AuditSink;
use crate::queue::{AsynchronousAuditQueue, RetryPolicy};

/// drain_pending の結果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub written: usize,
    pub failures: usize,
    /// 連続失敗が上限に達して途中でやめた
    pub gave_up: bool,
}

enum Step {
    Idle,
    Written,
    Failed,
}

pub struct AuditDrainLoop {
    queue: Arc<AsynchronousAuditQueue>,
    sink: Arc<dyn AuditSink>,
    retry: RetryPolicy,
    poll_interval: Duration,
    max_flush_failures: u32,
}

impl AuditDrainLoop {
    pub fn new(
        queue: Arc<AsynchronousAuditQueue>,
        sink: Arc<dyn AuditSink>,
        retry: RetryPolicy,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            sink,
            retry,
            poll_interval,
            max_flush_failures: 10,
        }
    }

    /// drain_pending が諦めるまでの連続失敗回数（run は諦めない）
    pub fn with_max_flush_failures(mut self, max: u32) -> Self {
        self.max_flush_failures = max;
        self
    }

    async fn step(&self) -> Step {
        let Some(entry) = self.queue.peek_next() else {
            return Step::Idle;
        };
        match self.sink.write(&entry).await {
            Ok(()) => {
                self.queue.remove(entry.entry_id);
                debug!(entry = %entry.entry_id, parcel = %entry.parcel_id, "audit entry drained");
                Step::Written
            }
            Err(err) => {
                warn!(entry = %entry.entry_id, parcel = %entry.parcel_id, error = %err, "audit drain write failed");
                Step::Failed
            }
        }
    }

    /// キューが空になるまで書き出す（シャットダウン時の flush、テスト用）。
    pub async fn drain_pending(&self) -> DrainReport {
        let mut report = DrainReport::default();
        let mut consecutive = 0u32;
        loop {
            match self.step().await {
                Step::Idle => return report,
                Step::Written => {
                    report.written += 1;
                    consecutive = 0;
                }
                Step::Failed => {
                    report.failures += 1;
                    consecutive += 1;
                    if consecutive >= self.max_flush_failures {
                        report.gave_up = true;
                        return report;
                    }
                    tokio::time::sleep(self.retry.next_delay(consecutive)).await;
                }
            }
        }
    }

    /// shutdown が true になるか、キューが close されて空になるまで回る。
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut consecutive = 0u32;
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.step().await {
                Step::Written => consecutive = 0,
                Step::Idle => {
                    consecutive = 0;
                    if self.queue.is_closed() {
                        break;
                    }
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                        _ = self.queue.wait_for_entry() => {}
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                Step::Failed => {
                    consecutive = consecutive.saturating_add(1);
                    let delay = self.retry.next_delay(consecutive);
                    debug!(failures = consecutive, ?delay, "backing off before retrying audit head");
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
        info!(backlog = self.queue.len(), "audit drain loop stopped");
    }

    pub fn spawn(self: Arc<Self>) -> DrainHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move { self.run(shutdown_rx).await });
        DrainHandle { shutdown_tx, join }
    }
}

/// `shutdown_tx` を drop してもループは止まる
pub struct DrainHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl DrainHandle {
    pub fn request_shutdown(&self) {
        // receiver が既に落ちていてもよい
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }

    /// 停止要求は出さずに終了を待つ（キューの close 後に使う）
    pub async fn join(self) {
        let _ = self.join.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AuditEntryId, AuditTrailEntry, EpisodeId, ParcelId, PayloadType, ResilienceParcel, UnitOfWorkId,
        UnitOfWorkRef, WorkerFunction, WorkerId,
    };
    use crate::impls::InMemoryAuditSink;
    use chrono::Utc;
    use ulid::Ulid;

    fn entry() -> AuditTrailEntry {
        let parcel = ResilienceParcel::register(
            ParcelId::from_ulid(Ulid::new()),
            EpisodeId::from_ulid(Ulid::new()),
            WorkerId::parse("w1").unwrap(),
            WorkerFunction::parse("ingest").unwrap(),
            UnitOfWorkRef {
                id: UnitOfWorkId::from_ulid(Ulid::new()),
                payload_type: PayloadType::parse("test.shipment.v1").unwrap(),
            },
            Utc::now(),
        );
        AuditTrailEntry::snapshot(AuditEntryId::from_ulid(Ulid::new()), &parcel, Utc::now())
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(5),
        }
    }

    fn drain_loop(queue: &Arc<AsynchronousAuditQueue>, sink: &Arc<InMemoryAuditSink>) -> AuditDrainLoop {
        AuditDrainLoop::new(queue.clone(), sink.clone(), fast_retry(), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn failing_head_is_retried_before_the_next_entry() {
        let queue = Arc::new(AsynchronousAuditQueue::new());
        let sink = Arc::new(InMemoryAuditSink::new());
        let entries: Vec<AuditTrailEntry> = (0..3).map(|_| entry()).collect();
        for e in &entries {
            queue.enqueue(e.clone());
        }
        sink.fail_next(1);

        let report = drain_loop(&queue, &sink).drain_pending().await;

        assert_eq!(report, DrainReport { written: 3, failures: 1, gave_up: false });
        assert_eq!(sink.entries(), entries);
        // 先頭が二回試行されてから二件目へ
        let ids: Vec<AuditEntryId> = entries.iter().map(|e| e.entry_id).collect();
        assert_eq!(sink.attempts(), vec![ids[0], ids[0], ids[1], ids[2]]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn flush_gives_up_but_keeps_the_backlog() {
        let queue = Arc::new(AsynchronousAuditQueue::new());
        let sink = Arc::new(InMemoryAuditSink::new());
        queue.enqueue(entry());
        sink.fail_next(100);

        let report = drain_loop(&queue, &sink)
            .with_max_flush_failures(3)
            .drain_pending()
            .await;

        assert!(report.gave_up);
        assert_eq!(report.failures, 3);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn spawned_loop_drains_new_entries_and_stops_on_shutdown() {
        let queue = Arc::new(AsynchronousAuditQueue::new());
        let sink = Arc::new(InMemoryAuditSink::new());
        let handle = Arc::new(drain_loop(&queue, &sink)).spawn();

        let e = entry();
        queue.enqueue(e.clone());

        tokio::time::timeout(Duration::from_secs(2), async {
            while !queue.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("entry should be drained");

        handle.shutdown_and_join().await;
        assert_eq!(sink.entries(), vec![e]);
    }

    #[tokio::test]
    async fn closed_queue_ends_the_loop_after_draining() {
        let queue = Arc::new(AsynchronousAuditQueue::new());
        let sink = Arc::new(InMemoryAuditSink::new());
        for _ in 0..4 {
            queue.enqueue(entry());
        }
        queue.close();
        sink.fail_next(2);

        let handle = Arc::new(drain_loop(&queue, &sink)).spawn();
        tokio::time::timeout(Duration::from_secs(2), handle.join())
            .await
            .expect("loop should stop once the closed queue is empty");

        assert_eq!(sink.entries().len(), 4);
        assert!(queue.is_empty());
    }
}
