//! All four services wired onto one in-process bus with in-memory stores.

use std::sync::Arc;

use billing_service::engine::PaymentEngine;
use billing_service::memory::InMemoryPaymentStore;
use notification_service::engine::NotificationEngine;
use notification_service::memory::InMemoryNotificationStore;
use notification_service::store::NotificationStore;
use order_service::engine::OrderEngine;
use order_service::memory::InMemoryOrderStore;
use shared::bus::memory::InMemoryBus;
use shared::bus::Publisher;
use shared::cache::InMemoryCache;
use shared::saga::LocalView;
use shared::{Compensator, Stage};
use stock_service::engine::ReservationEngine;
use stock_service::memory::InMemoryStockStore;
use stock_service::store::StockStore;

const WORKER_LIMIT: usize = 16;
const COMPENSATION_QUEUE: usize = 64;

pub struct Harness {
    pub bus: Arc<InMemoryBus>,
    pub orders: Arc<InMemoryOrderStore>,
    pub stock: Arc<InMemoryStockStore>,
    pub payments: Arc<InMemoryPaymentStore>,
    pub notifications: Arc<InMemoryNotificationStore>,
    pub billing: Arc<PaymentEngine>,
    pub notifier: Arc<NotificationEngine>,
    pub stock_compensator: Compensator,
    pub billing_compensator: Compensator,
}

impl Harness {
    pub async fn start(quantities: impl IntoIterator<Item = (i64, i32)>) -> Self {
        let bus = InMemoryBus::new();
        let publisher: Arc<dyn Publisher> = bus.clone();

        let orders = Arc::new(InMemoryOrderStore::new());
        let stock = Arc::new(InMemoryStockStore::with_quantities(quantities));
        let payments = Arc::new(InMemoryPaymentStore::new());
        let notifications = Arc::new(InMemoryNotificationStore::new());

        let (stock_compensator, _) = Compensator::spawn(publisher.clone(), COMPENSATION_QUEUE);
        let (billing_compensator, _) = Compensator::spawn(publisher.clone(), COMPENSATION_QUEUE);

        let order_engine = Arc::new(OrderEngine::new(orders.clone(), publisher.clone()));
        let reservation_engine = Arc::new(ReservationEngine::new(
            stock.clone(),
            publisher.clone(),
            stock_compensator.clone(),
        ));
        let billing = Arc::new(PaymentEngine::new(
            payments.clone(),
            Arc::new(InMemoryCache::new()),
            publisher.clone(),
            billing_compensator.clone(),
        ));
        let notifier = Arc::new(NotificationEngine::new(notifications.clone(), publisher));

        bus.attach(Arc::new(order_service::handlers::routes(order_engine, WORKER_LIMIT)))
            .await;
        bus.attach(Arc::new(stock_service::handlers::routes(
            reservation_engine,
            WORKER_LIMIT,
        )))
        .await;
        bus.attach(Arc::new(billing_service::handlers::routes(
            billing.clone(),
            WORKER_LIMIT,
        )))
        .await;
        bus.attach(Arc::new(notification_service::handlers::routes(
            notifier.clone(),
            WORKER_LIMIT,
        )))
        .await;

        Self {
            bus,
            orders,
            stock,
            payments,
            notifications,
            billing,
            notifier,
            stock_compensator,
            billing_compensator,
        }
    }

    /// What every service holds about `order_id` right now.
    pub async fn view(&self, order_id: i64) -> LocalView {
        LocalView {
            order_exists: self.orders.exists(order_id).await,
            reservations: self
                .stock
                .reservations(order_id)
                .await
                .map_or(0, |rows| rows.len()),
            payment: self.payments.status(order_id).await,
            notifications: self
                .notifications
                .for_order(order_id)
                .await
                .map_or(0, |rows| rows.len()),
        }
    }

    pub async fn stage(&self, order_id: i64) -> Option<Stage> {
        Stage::observe(&self.view(order_id).await)
    }
}
