//! Recording publisher for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

use super::{BusError, Publisher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

impl Published {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

#[derive(Default)]
pub struct MockPublisher {
    published: RwLock<Vec<Published>>,
    fail_on_publish: AtomicBool,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_publish(&self, fail: bool) {
        self.fail_on_publish.store(fail, Ordering::SeqCst);
    }

    pub async fn published(&self) -> Vec<Published> {
        self.published.read().await.clone()
    }

    pub async fn on_topic(&self, topic: &str) -> Vec<Published> {
        self.published
            .read()
            .await
            .iter()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect()
    }

    pub async fn count(&self, topic: &str) -> usize {
        self.published
            .read()
            .await
            .iter()
            .filter(|p| p.topic == topic)
            .count()
    }

    /// Polls until at least `n` messages reached `topic` or `timeout` passes.
    pub async fn wait_for(&self, topic: &str, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.count(topic).await >= n {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BusError> {
        if self.fail_on_publish.load(Ordering::SeqCst) {
            return Err(BusError::Publish {
                topic: topic.to_string(),
                reason: "mock publish failure".to_string(),
            });
        }

        self.published.write().await.push(Published {
            topic: topic.to_string(),
            key: key.to_string(),
            payload,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::publish_json;
    use crate::messages::ResetMsg;

    #[tokio::test]
    async fn records_keyed_json() {
        let publisher = MockPublisher::new();
        let msg = ResetMsg {
            order_id: 12,
            err_msg: "boom".into(),
        };
        publish_json(&publisher, "reset", msg.order_id, &msg)
            .await
            .unwrap();

        let published = publisher.on_topic("reset").await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].key, "12");
        assert_eq!(published[0].decode::<ResetMsg>().unwrap(), msg);
    }

    #[tokio::test]
    async fn can_be_told_to_fail() {
        let publisher = MockPublisher::new();
        publisher.set_fail_on_publish(true);
        let err = publisher
            .publish("reset", "1", b"{}".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Publish { .. }));
        assert_eq!(publisher.count("reset").await, 0);
    }
}
