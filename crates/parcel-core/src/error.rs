//! Errors - エラー型と分類

use thiserror::Error;

use crate::domain::{ParcelId, ProcessingStatus};
use crate::ports::{CacheError, SinkError};

/// ErrorKind は失敗の運用分類
///
/// - InvalidArgument: 呼び出し側の入力不備（リトライ無意味）
/// - NotFound: 参照先の parcel が存在しない
/// - InvalidTransition: 状態機械が許さない遷移
/// - SinkUnavailable / Infrastructure: 外部依存の障害（リトライ推奨）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    InvalidTransition,
    SinkUnavailable,
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum ParcelError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("parcel not found: {0}")]
    NotFound(ParcelId),

    #[error("invalid transition for {parcel}: {from} -> {to}")]
    InvalidTransition {
        parcel: ParcelId,
        from: ProcessingStatus,
        to: ProcessingStatus,
    },

    #[error(transparent)]
    SinkUnavailable(#[from] SinkError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl ParcelError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::SinkUnavailable(_) => ErrorKind::SinkUnavailable,
            Self::Cache(_) => ErrorKind::Infrastructure,
        }
    }
}

pub type Result<T, E = ParcelError> = std::result::Result<T, E>;
