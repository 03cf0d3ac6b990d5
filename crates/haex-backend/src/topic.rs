use std::collections::HashMap;

use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

/// Per-key broadcast fan-out: one lazily created broadcast channel per
/// channel/message/scope id. Publishing to a key nobody subscribed to is a
/// no-op, and a key whose last receiver has gone away is dropped on the
/// next publish.
pub(crate) struct Topics<T> {
    inner: RwLock<HashMap<Uuid, broadcast::Sender<T>>>,
}

/// Events buffered per topic before a slow receiver starts lagging.
const TOPIC_CAPACITY: usize = 256;

impl<T: Clone> Topics<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub async fn subscribe(&self, key: Uuid) -> broadcast::Receiver<T> {
        let mut topics = self.inner.write().await;
        topics
            .entry(key)
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    pub async fn publish(&self, key: Uuid, event: T) {
        let mut topics = self.inner.write().await;
        if let Some(tx) = topics.get(&key) {
            if tx.send(event).is_err() {
                topics.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_only_to_matching_key() {
        let topics: Topics<u32> = Topics::new();
        let key_a = Uuid::new_v4();
        let key_b = Uuid::new_v4();

        let mut rx_a = topics.subscribe(key_a).await;
        let mut rx_b = topics.subscribe(key_b).await;

        topics.publish(key_a, 7).await;

        assert_eq!(rx_a.recv().await.unwrap(), 7);
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let topics: Topics<u32> = Topics::new();
        topics.publish(Uuid::new_v4(), 1).await;
    }

    #[tokio::test]
    async fn dead_topic_is_pruned_after_publish() {
        let topics: Topics<u32> = Topics::new();
        let key = Uuid::new_v4();

        drop(topics.subscribe(key).await);
        topics.publish(key, 1).await;

        assert!(topics.inner.read().await.is_empty());
    }
}
