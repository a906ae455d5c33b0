//! ClusterCache port - クラスタ共有のキー・バリューキャッシュ
//!
//! 値は JSON で保持する（メンバー間のワイヤ形式）。map は名前で区別する。

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cluster cache unavailable: {0}")]
    Unavailable(String),

    #[error("cluster cache codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

#[async_trait]
pub trait ClusterCache: Send + Sync {
    async fn put(&self, map: &str, key: &str, value: serde_json::Value) -> Result<(), CacheError>;

    async fn get(&self, map: &str, key: &str) -> Result<Option<serde_json::Value>, CacheError>;

    async fn remove(&self, map: &str, key: &str) -> Result<Option<serde_json::Value>, CacheError>;

    /// map 内の全エントリ（キー順）
    async fn entries(&self, map: &str) -> Result<Vec<(String, serde_json::Value)>, CacheError>;

    /// 集合 map への追加（挿入順を保持、重複は無視）
    async fn add_to_set(&self, map: &str, key: &str, member: &str) -> Result<(), CacheError>;

    async fn set_members(&self, map: &str, key: &str) -> Result<Vec<String>, CacheError>;
}
