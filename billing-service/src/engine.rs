use std::sync::Arc;
use std::time::Duration;

use shared::bus::{publish_json, Publisher};
use shared::cache::Cache;
use shared::{topics, Compensator, ServiceError};
use tracing::{debug, info, warn};

use crate::models::Payment;
use crate::store::PaymentStore;

/// How long a payment stays in the cache after it was written.
pub const PAYMENT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Payment side of the saga: a status machine in the store with a
/// cache-aside read path. Cache failures are logged and never fail a call.
pub struct PaymentEngine {
    store: Arc<dyn PaymentStore>,
    cache: Arc<dyn Cache>,
    publisher: Arc<dyn Publisher>,
    compensator: Compensator,
}

impl PaymentEngine {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        cache: Arc<dyn Cache>,
        publisher: Arc<dyn Publisher>,
        compensator: Compensator,
    ) -> Self {
        Self {
            store,
            cache,
            publisher,
            compensator,
        }
    }

    pub async fn add_payment(
        &self,
        order_id: i64,
        user_id: i64,
        total: f64,
    ) -> Result<(), ServiceError> {
        let payment = match self.store.add(order_id, user_id, total).await {
            Ok(payment) => payment,
            Err(e) => {
                let e = e.context("add payment");
                self.compensator.reset(order_id, &e);
                return Err(e);
            }
        };

        info!(order_id, user_id, total, "payment pending");
        self.cache_payment(&payment).await;

        publish_json(
            self.publisher.as_ref(),
            topics::PENDING_PAYMENTS,
            order_id,
            &payment.event(),
        )
        .await
        .map_err(|e| ServiceError::from(e).context("send pending payment"))
    }

    pub async fn get_payment(&self, order_id: i64) -> Result<Payment, ServiceError> {
        match self.cache.get(&order_id.to_string()).await {
            Ok(Some(raw)) => {
                return serde_json::from_str::<Payment>(&raw).map_err(|e| {
                    ServiceError::Internal(format!(
                        "cached payment for order {order_id} of unexpected shape: {e}"
                    ))
                });
            }
            Ok(None) => debug!(order_id, "payment cache miss"),
            Err(e) => warn!(order_id, error = %e, "get cache value"),
        }

        let payment = self
            .store
            .get(order_id)
            .await
            .map_err(|e| e.context("get payment"))?;
        self.cache_payment(&payment).await;
        Ok(payment)
    }

    pub async fn approve_payment(&self, order_id: i64) -> Result<(), ServiceError> {
        let payment = match self.store.approve(order_id).await {
            Ok(payment) => payment,
            // A redelivered receipt for a paid order.
            Err(e @ ServiceError::Conflict(_)) => {
                warn!(order_id, "payment already approved");
                return Err(e.context("approve payment"));
            }
            Err(e) => {
                let e = e.context("approve payment");
                self.compensator.reset(order_id, &e);
                return Err(e);
            }
        };

        info!(order_id, total = payment.total, "payment approved");
        self.cache_payment(&payment).await;

        publish_json(
            self.publisher.as_ref(),
            topics::PAID_PAYMENTS,
            order_id,
            &payment.event(),
        )
        .await
        .map_err(|e| ServiceError::from(e).context("send paid payment"))
    }

    pub async fn cancel_payment(&self, order_id: i64) -> Result<(), ServiceError> {
        let cancelled = self
            .store
            .cancel(order_id)
            .await
            .map_err(|e| e.context("cancel payment"))?;

        match cancelled {
            Some(payment) => {
                info!(order_id, "payment cancelled");
                self.cache_payment(&payment).await;
            }
            None => debug!(order_id, "no pending payment to cancel"),
        }
        Ok(())
    }

    async fn cache_payment(&self, payment: &Payment) {
        let value = match serde_json::to_string(payment) {
            Ok(value) => value,
            Err(e) => {
                warn!(order_id = payment.order_id, error = %e, "encode cache value");
                return;
            }
        };

        if let Err(e) = self
            .cache
            .set(&payment.order_id.to_string(), value, PAYMENT_TTL)
            .await
        {
            warn!(order_id = payment.order_id, error = %e, "set cache value");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryPaymentStore;
    use shared::bus::mock::MockPublisher;
    use shared::cache::{InMemoryCache, RedisCache};
    use shared::{PaymentEvent, PaymentStatus, ResetMsg};

    struct Fixture {
        engine: PaymentEngine,
        store: Arc<InMemoryPaymentStore>,
        cache: Arc<InMemoryCache>,
        publisher: Arc<MockPublisher>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryPaymentStore::new());
        let cache = Arc::new(InMemoryCache::new());
        let publisher = Arc::new(MockPublisher::new());
        let (compensator, _worker) = Compensator::spawn(publisher.clone(), 16);
        let engine = PaymentEngine::new(
            store.clone(),
            cache.clone(),
            publisher.clone(),
            compensator,
        );
        Fixture {
            engine,
            store,
            cache,
            publisher,
        }
    }

    #[tokio::test]
    async fn add_caches_and_emits_pending_payment() {
        let f = fixture();
        f.engine.add_payment(1, 7, 100.0).await.unwrap();

        let sent = f.publisher.on_topic(topics::PENDING_PAYMENTS).await;
        assert_eq!(sent.len(), 1);
        let event: PaymentEvent = sent[0].decode().unwrap();
        assert_eq!(event.total, 100.0);
        assert_eq!(f.cache.len().await, 1);
        assert_eq!(f.store.status(1).await, Some(PaymentStatus::Pending));
    }

    #[tokio::test]
    async fn failed_add_queues_reset() {
        let f = fixture();
        f.engine.add_payment(1, 7, 100.0).await.unwrap();

        let err = f.engine.add_payment(1, 7, 100.0).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
        assert!(f
            .publisher
            .wait_for(topics::RESET, 1, Duration::from_secs(1))
            .await);
        let reset: ResetMsg = f.publisher.on_topic(topics::RESET).await[0].decode().unwrap();
        assert_eq!(reset.order_id, 1);
    }

    #[tokio::test]
    async fn get_reads_through_cache() {
        let f = fixture();
        f.store.add(5, 7, 20.0).await.unwrap();
        assert_eq!(f.cache.len().await, 0);

        let from_store = f.engine.get_payment(5).await.unwrap();
        assert_eq!(f.cache.len().await, 1);

        f.store.set_failing(true);
        let from_cache = f.engine.get_payment(5).await.unwrap();
        assert_eq!(from_cache, from_store);
    }

    #[tokio::test]
    async fn cache_failure_falls_back_to_store() {
        let f = fixture();
        f.engine.add_payment(5, 7, 20.0).await.unwrap();
        f.cache.set_failing(true);

        let payment = f.engine.get_payment(5).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn unreachable_redis_falls_back_to_store() {
        let store = Arc::new(InMemoryPaymentStore::new());
        let publisher = Arc::new(MockPublisher::new());
        let (compensator, _worker) = Compensator::spawn(publisher.clone(), 16);
        let timeout = Duration::from_millis(100);
        let cache = RedisCache::new("redis://127.0.0.1:1", "payments", timeout).unwrap();
        let engine = PaymentEngine::new(store, Arc::new(cache), publisher.clone(), compensator);

        engine.add_payment(5, 7, 20.0).await.unwrap();
        let payment = engine.get_payment(5).await.unwrap();

        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.total, 20.0);
        assert_eq!(publisher.count(topics::PENDING_PAYMENTS).await, 1);
    }

    #[tokio::test]
    async fn unexpected_cached_shape_is_internal() {
        let f = fixture();
        f.cache.put_raw("5", "[1, 2, 3]", PAYMENT_TTL).await;
        assert_eq!(f.engine.get_payment(5).await.unwrap_err().kind(), "internal");
    }

    #[tokio::test]
    async fn approve_emits_paid_payment_and_refreshes_cache() {
        let f = fixture();
        f.engine.add_payment(1, 7, 100.0).await.unwrap();
        f.engine.approve_payment(1).await.unwrap();

        let paid = f.publisher.on_topic(topics::PAID_PAYMENTS).await;
        assert_eq!(paid.len(), 1);
        assert_eq!(
            paid[0].decode::<PaymentEvent>().unwrap(),
            PaymentEvent {
                order_id: 1,
                user_id: 7,
                total: 100.0
            }
        );

        f.store.set_failing(true);
        let cached = f.engine.get_payment(1).await.unwrap();
        assert_eq!(cached.status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn approving_unknown_payment_queues_reset() {
        let f = fixture();
        let err = f.engine.approve_payment(9).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert!(f
            .publisher
            .wait_for(topics::RESET, 1, Duration::from_secs(1))
            .await);
    }

    #[tokio::test]
    async fn redelivered_receipt_is_not_compensated() {
        let f = fixture();
        f.engine.add_payment(1, 7, 100.0).await.unwrap();
        f.engine.approve_payment(1).await.unwrap();

        assert_eq!(f.engine.approve_payment(1).await.unwrap_err().kind(), "conflict");
        assert!(!f
            .publisher
            .wait_for(topics::RESET, 1, Duration::from_millis(50))
            .await);
        assert_eq!(f.publisher.count(topics::PAID_PAYMENTS).await, 1);
    }

    #[tokio::test]
    async fn cancel_marks_pending_payment_cancelled() {
        let f = fixture();
        f.engine.add_payment(1, 7, 100.0).await.unwrap();
        f.engine.cancel_payment(1).await.unwrap();
        f.engine.cancel_payment(1).await.unwrap();
        f.engine.cancel_payment(2).await.unwrap();

        assert_eq!(f.store.status(1).await, Some(PaymentStatus::Cancelled));
        assert_eq!(
            f.engine.get_payment(1).await.unwrap().status,
            PaymentStatus::Cancelled
        );
        assert_eq!(f.publisher.count(topics::RESET).await, 0);
    }
}
