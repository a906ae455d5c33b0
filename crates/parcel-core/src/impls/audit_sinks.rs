//! AuditSink 実装
//!
//! - InMemoryAuditSink: テスト・デモ用。障害注入（fail_next）あり
//! - TracingAuditSink: tracing のイベントとして出すだけ
//! - JsonLinesAuditSink: 1 行 1 エントリの JSON Lines ファイルに追記

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::domain::{AuditEntryId, AuditTrailEntry};
use crate::ports::{AuditSink, SinkError};

#[derive(Default)]
struct MemoryState {
    entries: Vec<AuditTrailEntry>,
    attempts: Vec<AuditEntryId>,
    failures_left: usize,
}

#[derive(Default)]
pub struct InMemoryAuditSink {
    state: Mutex<MemoryState>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 次の n 回の write を Unavailable で失敗させる
    pub fn fail_next(&self, n: usize) {
        self.lock().failures_left = n;
    }

    /// 書き込みに成功したエントリ（到着順）
    pub fn entries(&self) -> Vec<AuditTrailEntry> {
        self.lock().entries.clone()
    }

    /// 失敗も含めた write 呼び出しの履歴
    pub fn attempts(&self) -> Vec<AuditEntryId> {
        self.lock().attempts.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn write(&self, entry: &AuditTrailEntry) -> Result<(), SinkError> {
        let mut state = self.lock();
        state.attempts.push(entry.entry_id);
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(SinkError::Unavailable("injected failure".into()));
        }
        state.entries.push(entry.clone());
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn write(&self, entry: &AuditTrailEntry) -> Result<(), SinkError> {
        info!(
            target: "parcel::audit",
            entry = %entry.entry_id,
            parcel = %entry.parcel_id,
            episode = %entry.episode_id,
            worker = %entry.worker,
            status = %entry.processing_status,
            "audit trail entry"
        );
        Ok(())
    }
}

pub struct JsonLinesAuditSink {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl JsonLinesAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for JsonLinesAuditSink {
    async fn write(&self, entry: &AuditTrailEntry) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        // 行が混ざらないよう追記は直列化する
        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
