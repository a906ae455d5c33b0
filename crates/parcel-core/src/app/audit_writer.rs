//! AuditWriter - parcel のスナップショットを監査シンクへ
//!
//! - synchronous: シンクの確認を待つ。失敗は false（ログのみ、リトライしない）
//! - asynchronous: キューに積んだ結果をすぐ返す。書き込みは AuditDrainLoop

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{AuditTrailEntry, ResilienceParcel};
use crate::ports::{AuditSink, Clock, IdGenerator};
use crate::queue::AsynchronousAuditQueue;

pub struct AuditWriter {
    sink: Arc<dyn AuditSink>,
    queue: Arc<AsynchronousAuditQueue>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl AuditWriter {
    pub fn new(
        sink: Arc<dyn AuditSink>,
        queue: Arc<AsynchronousAuditQueue>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sink,
            queue,
            ids,
            clock,
        }
    }

    pub async fn write_audit_entry(&self, parcel: &ResilienceParcel, synchronous: bool) -> bool {
        let entry = AuditTrailEntry::snapshot(self.ids.audit_entry_id(), parcel, self.clock.now());

        if !synchronous {
            let accepted = self.queue.enqueue(entry);
            if !accepted {
                warn!(parcel = %parcel.identifier(), "audit queue rejected entry");
            }
            return accepted;
        }

        match self.sink.write(&entry).await {
            Ok(()) => {
                debug!(entry = %entry.entry_id, parcel = %entry.parcel_id, "audit entry written");
                true
            }
            Err(err) => {
                warn!(entry = %entry.entry_id, parcel = %entry.parcel_id, error = %err, "audit write failed");
                false
            }
        }
    }

    pub fn queue(&self) -> &Arc<AsynchronousAuditQueue> {
        &self.queue
    }
}
