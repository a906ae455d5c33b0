//! TopicSubscriptionRegistry - payload type ごとの購読 worker

use std::collections::{BTreeSet, HashMap};

use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{PayloadType, WorkerId};
use crate::error::ParcelError;

#[derive(Default)]
pub struct TopicSubscriptionRegistry {
    topics: RwLock<HashMap<PayloadType, BTreeSet<WorkerId>>>,
}

impl TopicSubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 冪等。空白の payload type / worker id は InvalidArgument。
    pub async fn subscribe(&self, payload_type: &str, worker: &str) -> Result<(), ParcelError> {
        let payload_type = PayloadType::parse(payload_type)?;
        let worker = WorkerId::parse(worker)?;
        let inserted = self
            .topics
            .write()
            .await
            .entry(payload_type.clone())
            .or_default()
            .insert(worker.clone());
        if inserted {
            debug!(%payload_type, %worker, "subscribed");
        }
        Ok(())
    }

    /// 購読を外す。最後の一人なら topic ごと消える。外したら true。
    pub async fn unsubscribe(&self, payload_type: &str, worker: &str) -> Result<bool, ParcelError> {
        let payload_type = PayloadType::parse(payload_type)?;
        let worker = WorkerId::parse(worker)?;
        let mut topics = self.topics.write().await;
        let Some(workers) = topics.get_mut(&payload_type) else {
            return Ok(false);
        };
        let removed = workers.remove(&worker);
        if workers.is_empty() {
            topics.remove(&payload_type);
        }
        Ok(removed)
    }

    /// 購読者がいなければ空集合。エラーにはしない。
    pub async fn subscribers_for(&self, payload_type: &str) -> BTreeSet<WorkerId> {
        self.topics
            .read()
            .await
            .get(payload_type.trim())
            .cloned()
            .unwrap_or_default()
    }

    pub async fn payload_types(&self) -> BTreeSet<PayloadType> {
        self.topics.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[tokio::test]
    async fn empty_registry_has_no_subscribers() {
        let registry = TopicSubscriptionRegistry::new();
        assert!(registry.subscribers_for("test.shipment.v1").await.is_empty());
        assert!(registry.subscribers_for("").await.is_empty());
        assert!(registry.payload_types().await.is_empty());
    }

    #[tokio::test]
    async fn double_subscribe_keeps_one_entry() {
        let registry = TopicSubscriptionRegistry::new();
        registry.subscribe("test.shipment.v1", "w1").await.unwrap();
        registry.subscribe("test.shipment.v1", "w1").await.unwrap();

        let subscribers = registry.subscribers_for("test.shipment.v1").await;
        assert_eq!(subscribers.len(), 1);
        assert!(subscribers.contains(&WorkerId::parse("w1").unwrap()));
    }

    #[rstest]
    #[case("", "w1")]
    #[case("   ", "w1")]
    #[case("test.shipment.v1", "")]
    #[case("test.shipment.v1", "\t")]
    #[tokio::test]
    async fn blank_arguments_are_rejected(#[case] payload_type: &str, #[case] worker: &str) {
        let registry = TopicSubscriptionRegistry::new();
        let err = registry.subscribe(payload_type, worker).await.unwrap_err();
        assert!(matches!(err, ParcelError::InvalidArgument(_)));
        assert!(registry.payload_types().await.is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_drops_empty_topics() {
        let registry = TopicSubscriptionRegistry::new();
        registry.subscribe("a.v1", "w1").await.unwrap();
        registry.subscribe("a.v1", "w2").await.unwrap();
        registry.subscribe("b.v1", "w1").await.unwrap();

        assert!(registry.unsubscribe("a.v1", "w1").await.unwrap());
        assert!(!registry.unsubscribe("a.v1", "w1").await.unwrap());
        assert_eq!(registry.subscribers_for("a.v1").await.len(), 1);

        assert!(registry.unsubscribe("b.v1", "w1").await.unwrap());
        let types: Vec<String> = registry
            .payload_types()
            .await
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(types, vec!["a.v1".to_string()]);
    }
}
