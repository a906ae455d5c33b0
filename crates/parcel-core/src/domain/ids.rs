//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID + Phantom Type
//! パーセル・エピソード・Unit of Work・監査エントリの ID はすべて ULID です。
//! `Id<T>` というジェネリック型で共通実装を提供し、`T` はマーカー型として
//! コンパイル時の型安全性だけを提供します（PhantomData）。
//!
//! ## ULID の特性
//! - **時刻でソート可能**: ストアの走査順序 = 作成順序
//! - **分散生成可能**: クラスタの各メンバーが調整なしで生成できる
//! - **文字列表現もソート可能**: クラスタキャッシュのキーとしてそのまま使える

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::ParcelError;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"parcel-", "episode-" など）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// `Display` の逆変換。プレフィックスは省略可能。
impl<T: IdMarker> FromStr for Id<T> {
    type Err = ParcelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw)
            .map(Self::from_ulid)
            .map_err(|e| ParcelError::invalid_argument(format!("malformed identifier {s:?}: {e}")))
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Parcel {}

impl IdMarker for Parcel {
    fn prefix() -> &'static str {
        "parcel-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Episode {}

impl IdMarker for Episode {
    fn prefix() -> &'static str {
        "episode-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Work {}

impl IdMarker for Work {
    fn prefix() -> &'static str {
        "uow-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AuditEntry {}

impl IdMarker for AuditEntry {
    fn prefix() -> &'static str {
        "audit-"
    }
}

/// Identifier of a parcel (one processing attempt of a unit of work at one worker).
pub type ParcelId = Id<Parcel>;

/// Identifier of an episode (all parcels of one end-to-end activity).
pub type EpisodeId = Id<Episode>;

/// Identifier of a unit of work (the payload travelling through the pipeline).
pub type UnitOfWorkId = Id<Work>;

/// Identifier of one audit-trail entry.
pub type AuditEntryId = Id<AuditEntry>;
