use std::sync::Arc;

use shared::bus::{publish_json, Publisher};
use shared::{topics, Compensator, Order, ServiceError};
use tracing::info;

use crate::store::StockStore;

/// Reservation side of the saga. Failed reserves and collects queue a
/// `reset` for the order before the error is returned.
pub struct ReservationEngine {
    store: Arc<dyn StockStore>,
    publisher: Arc<dyn Publisher>,
    compensator: Compensator,
}

impl ReservationEngine {
    pub fn new(
        store: Arc<dyn StockStore>,
        publisher: Arc<dyn Publisher>,
        compensator: Compensator,
    ) -> Self {
        Self {
            store,
            publisher,
            compensator,
        }
    }

    pub fn store(&self) -> &Arc<dyn StockStore> {
        &self.store
    }

    pub async fn reserve(&self, order: &Order) -> Result<(), ServiceError> {
        if let Err(e) = self.store.reserve(order.order_id, &order.items).await {
            let e = e.context("reserve");
            self.compensator.reset(order.order_id, &e);
            return Err(e);
        }

        info!(order_id = order.order_id, items = order.items.len(), "stock reserved");

        publish_json(
            self.publisher.as_ref(),
            topics::RESERVED_ORDERS,
            order.order_id,
            order,
        )
        .await
        .map_err(|e| ServiceError::from(e).context("send reserved order"))
    }

    pub async fn cancel_reservation(&self, order_id: i64) -> Result<(), ServiceError> {
        let restored = self
            .store
            .cancel_reservation(order_id)
            .await
            .map_err(|e| e.context("cancel reservations"))?;

        info!(order_id, products = restored.len(), "reservation cancelled");
        Ok(())
    }

    pub async fn collect(&self, order_id: i64) -> Result<(), ServiceError> {
        match self.store.collect(order_id).await {
            Ok(collected) => {
                info!(order_id, products = collected.len(), "stock collected");
                Ok(())
            }
            Err(e) => {
                let e = e.context("collect");
                self.compensator.reset(order_id, &e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStockStore;
    use chrono::{TimeZone, Utc};
    use shared::bus::mock::MockPublisher;
    use shared::{Item, ResetMsg};
    use std::time::Duration;

    fn order(order_id: i64, product_id: i64, quantity: i32) -> Order {
        Order {
            order_id,
            user_id: 7,
            total: 100.0,
            delivery_date: Utc.with_ymd_and_hms(2022, 6, 4, 0, 0, 0).unwrap(),
            email: "buyer@example.com".into(),
            items: vec![Item {
                product_id,
                quantity,
            }],
        }
    }

    fn engine(
        store: Arc<InMemoryStockStore>,
    ) -> (ReservationEngine, Arc<MockPublisher>) {
        let publisher = Arc::new(MockPublisher::new());
        let (compensator, _worker) = Compensator::spawn(publisher.clone(), 16);
        let engine = ReservationEngine::new(store, publisher.clone(), compensator);
        (engine, publisher)
    }

    #[tokio::test]
    async fn reserve_emits_reserved_order() {
        let store = Arc::new(InMemoryStockStore::with_quantities([(5, 10)]));
        let (engine, publisher) = engine(store.clone());

        engine.reserve(&order(1, 5, 2)).await.unwrap();

        let sent = publisher.on_topic(topics::RESERVED_ORDERS).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].key, "1");
        assert_eq!(sent[0].decode::<Order>().unwrap(), order(1, 5, 2));
        assert_eq!(store.quantity(5).await.unwrap(), Some(8));
    }

    #[tokio::test]
    async fn failed_reserve_queues_reset() {
        let store = Arc::new(InMemoryStockStore::with_quantities([(5, 1)]));
        let (engine, publisher) = engine(store.clone());

        let err = engine.reserve(&order(3, 5, 2)).await.unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientStock { order_id: 3 }));

        assert!(publisher.wait_for(topics::RESET, 1, Duration::from_secs(1)).await);
        let reset: ResetMsg = publisher.on_topic(topics::RESET).await[0].decode().unwrap();
        assert_eq!(reset.order_id, 3);
        assert_eq!(publisher.count(topics::RESERVED_ORDERS).await, 0);
        assert_eq!(store.quantity(5).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn failed_collect_queues_reset() {
        let store = Arc::new(InMemoryStockStore::with_quantities([(5, 10)]));
        let (engine, publisher) = engine(store.clone());
        store.set_failing(true);

        assert_eq!(engine.collect(4).await.unwrap_err().kind(), "internal");
        assert!(publisher.wait_for(topics::RESET, 1, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn cancel_failure_is_not_compensated() {
        let store = Arc::new(InMemoryStockStore::with_quantities([(5, 10)]));
        let (engine, publisher) = engine(store.clone());
        store.set_failing(true);

        assert!(engine.cancel_reservation(4).await.is_err());
        assert!(!publisher.wait_for(topics::RESET, 1, Duration::from_millis(50)).await);
    }
}
