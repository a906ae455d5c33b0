//! AuditSink port - 監査証跡の書き込み先

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::AuditTrailEntry;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("audit sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit entry encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// 書き込みは at-least-once。同じ entry_id が二度届くことがある。
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn write(&self, entry: &AuditTrailEntry) -> Result<(), SinkError>;
}
