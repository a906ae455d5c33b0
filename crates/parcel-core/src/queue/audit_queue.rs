//! AsynchronousAuditQueue - 監査エントリの非同期書き込みキュー
//!
//! # 契約
//! - FIFO。ドレインループは peek → write → remove の順で処理する
//!   （書き込みに成功するまで先頭から消さない = at-least-once）
//! - 同じ entry_id は二重に積まない
//! - close 後の enqueue は拒否。残っている分は drain できる

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::domain::{AuditEntryId, AuditTrailEntry};

#[derive(Default)]
struct QueueState {
    entries: VecDeque<AuditTrailEntry>,
    /// entries に入っている entry_id（重複判定用）
    queued: HashSet<AuditEntryId>,
    closed: bool,
}

#[derive(Default)]
pub struct AsynchronousAuditQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl AsynchronousAuditQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 末尾に追加。closed または同じ entry_id が積まれていれば false。
    pub fn enqueue(&self, entry: AuditTrailEntry) -> bool {
        {
            let mut state = self.lock();
            if state.closed || !state.queued.insert(entry.entry_id) {
                return false;
            }
            state.entries.push_back(entry);
        }
        self.notify.notify_one();
        true
    }

    /// 先頭のコピー（取り除かない）
    pub fn peek_next(&self) -> Option<AuditTrailEntry> {
        self.lock().entries.front().cloned()
    }

    /// entry_id 指定で取り除く。見つからなければ false。
    pub fn remove(&self, entry_id: AuditEntryId) -> bool {
        let mut state = self.lock();
        if !state.queued.remove(&entry_id) {
            return false;
        }
        // ドレインループは先頭を消すので、ほとんどの場合 index 0
        if let Some(index) = state.entries.iter().position(|e| e.entry_id == entry_id) {
            state.entries.remove(index);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// エントリが積まれるか close されるまで待つ
    pub async fn wait_for_entry(&self) {
        loop {
            let notified = self.notify.notified();
            {
                let state = self.lock();
                if !state.entries.is_empty() || state.closed {
                    return;
                }
            }
            notified.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        EpisodeId, ParcelId, PayloadType, ResilienceParcel, UnitOfWorkId, UnitOfWorkRef, WorkerFunction, WorkerId,
    };
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;
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

    #[test]
    fn fifo_peek_then_remove() {
        let queue = AsynchronousAuditQueue::new();
        let (a, b) = (entry(), entry());
        assert!(queue.enqueue(a.clone()));
        assert!(queue.enqueue(b.clone()));

        // peek は取り除かない
        assert_eq!(queue.peek_next(), Some(a.clone()));
        assert_eq!(queue.peek_next(), Some(a.clone()));
        assert_eq!(queue.len(), 2);

        assert!(queue.remove(a.entry_id));
        assert_eq!(queue.peek_next(), Some(b.clone()));
        assert!(queue.remove(b.entry_id));
        assert!(queue.is_empty());
        assert!(!queue.remove(b.entry_id));
    }

    #[test]
    fn duplicate_entry_ids_are_ignored() {
        let queue = AsynchronousAuditQueue::new();
        let a = entry();
        assert!(queue.enqueue(a.clone()));
        assert!(!queue.enqueue(a));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn duplicate_index_follows_removals_in_a_large_backlog() {
        let queue = AsynchronousAuditQueue::new();
        let backlog: Vec<_> = (0..10_000).map(|_| entry()).collect();
        for e in &backlog {
            assert!(queue.enqueue(e.clone()));
        }
        for e in &backlog {
            assert!(!queue.enqueue(e.clone()));
        }

        // 途中のエントリを消すと、同じ id は再び積める
        let middle = backlog[5_000].clone();
        assert!(queue.remove(middle.entry_id));
        assert_eq!(queue.len(), 9_999);
        assert!(queue.enqueue(middle));
        assert_eq!(queue.len(), 10_000);
        assert_eq!(queue.peek_next(), Some(backlog[0].clone()));
    }

    #[test]
    fn closed_queue_rejects_but_keeps_backlog() {
        let queue = AsynchronousAuditQueue::new();
        let a = entry();
        queue.enqueue(a.clone());
        queue.close();

        assert!(queue.is_closed());
        assert!(!queue.enqueue(entry()));
        assert_eq!(queue.peek_next(), Some(a));
    }

    #[tokio::test]
    async fn wait_for_entry_wakes_on_enqueue() {
        let queue = Arc::new(AsynchronousAuditQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.wait_for_entry().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(entry());

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn wait_for_entry_wakes_on_close() {
        let queue = Arc::new(AsynchronousAuditQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.wait_for_entry().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }
}
