//! In-process bus: every publish is recorded and dispatched to the attached
//! routers, so whole choreographies can run without a broker.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;

use super::mock::MockPublisher;
use super::{publish_json, BusError, Publisher};
use crate::router::{Delivery, Router};

#[derive(Default)]
pub struct InMemoryBus {
    log: MockPublisher,
    routers: RwLock<Vec<Arc<Router>>>,
    offset: AtomicI64,
}

impl InMemoryBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscribes a router to every topic it has routes for.
    pub async fn attach(&self, router: Arc<Router>) {
        self.routers.write().await.push(router);
    }

    /// Everything published so far, in publish order.
    pub fn log(&self) -> &MockPublisher {
        &self.log
    }

    /// Publishes on behalf of an external producer.
    pub async fn inject<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        order_id: i64,
        msg: &T,
    ) -> Result<(), BusError> {
        publish_json(self, topic, order_id, msg).await
    }

    /// Waits until no handler is running and nothing was published for a
    /// short quiet period. Routers stay open.
    pub async fn settle(&self) {
        loop {
            let before = self.offset.load(Ordering::SeqCst);
            let busy = self
                .routers
                .read()
                .await
                .iter()
                .any(|router| router.in_flight() > 0);
            tokio::time::sleep(Duration::from_millis(10)).await;
            if !busy && self.offset.load(Ordering::SeqCst) == before {
                return;
            }
        }
    }

    /// Waits for every attached router to finish its in-flight handlers.
    pub async fn drain(&self) {
        for router in self.routers.read().await.iter() {
            router.drain().await;
        }
    }
}

#[async_trait]
impl Publisher for InMemoryBus {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.log.publish(topic, key, payload.clone()).await?;

        let offset = self.offset.fetch_add(1, Ordering::SeqCst);
        let routers = self.routers.read().await.clone();
        for router in routers {
            let delivery = Delivery {
                topic: topic.to_string(),
                key: Some(key.to_string()),
                payload: payload.clone(),
                partition: 0,
                offset,
            };
            router.dispatch(delivery).await;
        }
        Ok(())
    }
}
