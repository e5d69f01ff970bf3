use std::sync::Arc;

use shared::messages::decode;
use shared::router::{handler_fn, middleware, Delivery, Router, RouterBuilder};
use shared::{topics, CheckReq, Order};

use crate::engine::NotificationEngine;

pub fn routes(engine: Arc<NotificationEngine>, worker_limit: usize) -> Router {
    let schedule = engine.clone();
    let check = engine;

    RouterBuilder::new()
        .worker_limit(worker_limit)
        .layer(middleware::logger())
        .route(
            topics::PAID_ORDERS,
            handler_fn(move |d: Arc<Delivery>| {
                let engine = schedule.clone();
                async move {
                    let order: Order = decode(&d.payload)?;
                    engine
                        .create_notification(order.order_id, order.user_id, order.delivery_date)
                        .await
                        .map(|_| ())
                }
            }),
        )
        .route(
            topics::CHECK,
            handler_fn(move |d: Arc<Delivery>| {
                let engine = check.clone();
                async move {
                    let _: CheckReq = decode(&d.payload)?;
                    engine.check().await.map(|_| ())
                }
            }),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryNotificationStore;
    use crate::store::NotificationStore;
    use shared::bus::mock::MockPublisher;
    use shared::Service;

    #[tokio::test]
    async fn paid_order_schedules_on_delivery_date() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let engine = Arc::new(NotificationEngine::new(
            store.clone(),
            Arc::new(MockPublisher::new()),
        ));
        let router = routes(engine, 4);

        let mut expected = Service::Notifications.consumes().to_vec();
        expected.sort_unstable();
        assert_eq!(router.topics(), expected);

        let raw = r#"{"order_id":1,"user_id":7,"total":100,"delivery_date":"2022-06-04T00:00:00Z","email":"a@b.c","items":[{"product_id":5,"quantity":2}]}"#;
        router.dispatch(Delivery::new(topics::PAID_ORDERS, raw)).await;
        router.drain().await;

        let scheduled = store.for_order(1).await.unwrap();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].ts.to_rfc3339(), "2022-06-04T00:00:00+00:00");
    }
}
