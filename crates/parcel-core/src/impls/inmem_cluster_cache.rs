//! InMemoryClusterCache - 開発用のクラスタキャッシュ
//!
//! clone したハンドル同士は同じ状態を共有するので、1 プロセス内で複数
//! メンバー（ClusteredParcelStore）を立てて複製をシミュレートできる。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::ports::{CacheError, ClusterCache};

#[derive(Default)]
struct CacheState {
    maps: HashMap<String, BTreeMap<String, serde_json::Value>>,
    sets: HashMap<String, BTreeMap<String, Vec<String>>>,
}

#[derive(Clone)]
pub struct InMemoryClusterCache {
    state: Arc<RwLock<CacheState>>,
    available: Arc<AtomicBool>,
}

impl InMemoryClusterCache {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(CacheState::default())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// 障害注入: false の間は全操作が Unavailable
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Unavailable("in-memory cluster cache is offline".into()))
        }
    }
}

impl Default for InMemoryClusterCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterCache for InMemoryClusterCache {
    async fn put(&self, map: &str, key: &str, value: serde_json::Value) -> Result<(), CacheError> {
        self.check()?;
        self.state
            .write()
            .await
            .maps
            .entry(map.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, map: &str, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state.maps.get(map).and_then(|m| m.get(key)).cloned())
    }

    async fn remove(&self, map: &str, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        self.check()?;
        let mut state = self.state.write().await;
        Ok(state.maps.get_mut(map).and_then(|m| m.remove(key)))
    }

    async fn entries(&self, map: &str) -> Result<Vec<(String, serde_json::Value)>, CacheError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .maps
            .get(map)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn add_to_set(&self, map: &str, key: &str, member: &str) -> Result<(), CacheError> {
        self.check()?;
        let mut state = self.state.write().await;
        let members = state
            .sets
            .entry(map.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default();
        if !members.iter().any(|m| m == member) {
            members.push(member.to_string());
        }
        Ok(())
    }

    async fn set_members(&self, map: &str, key: &str) -> Result<Vec<String>, CacheError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .sets
            .get(map)
            .and_then(|m| m.get(key))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn clones_share_state() {
        let a = InMemoryClusterCache::new();
        let b = a.clone();

        a.put("m", "k", json!({"v": 1})).await.unwrap();
        assert_eq!(b.get("m", "k").await.unwrap(), Some(json!({"v": 1})));

        b.remove("m", "k").await.unwrap();
        assert_eq!(a.get("m", "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn entries_are_key_ordered() {
        let cache = InMemoryClusterCache::new();
        cache.put("m", "b", json!(2)).await.unwrap();
        cache.put("m", "a", json!(1)).await.unwrap();

        let keys: Vec<String> = cache.entries("m").await.unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        assert!(cache.entries("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sets_keep_insertion_order_without_duplicates() {
        let cache = InMemoryClusterCache::new();
        cache.add_to_set("s", "k", "x").await.unwrap();
        cache.add_to_set("s", "k", "y").await.unwrap();
        cache.add_to_set("s", "k", "x").await.unwrap();

        assert_eq!(cache.set_members("s", "k").await.unwrap(), vec!["x", "y"]);
    }

    #[tokio::test]
    async fn offline_cache_fails_every_operation() {
        let cache = InMemoryClusterCache::new();
        cache.set_available(false);

        assert!(matches!(cache.get("m", "k").await, Err(CacheError::Unavailable(_))));
        assert!(matches!(cache.put("m", "k", json!(1)).await, Err(CacheError::Unavailable(_))));

        cache.set_available(true);
        assert!(cache.get("m", "k").await.unwrap().is_none());
    }
}
