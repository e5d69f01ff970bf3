use std::sync::Arc;

use shared::bus::{publish_json, Publisher};
use shared::{topics, CreateOrderReq, Order, ServiceError};
use tracing::{debug, info};

use crate::store::OrderStore;

pub struct OrderEngine {
    store: Arc<dyn OrderStore>,
    publisher: Arc<dyn Publisher>,
}

impl OrderEngine {
    pub fn new(store: Arc<dyn OrderStore>, publisher: Arc<dyn Publisher>) -> Self {
        Self { store, publisher }
    }

    /// Saves a new order and hands it to stock on `saved_orders`.
    pub async fn create(&self, req: CreateOrderReq) -> Result<i64, ServiceError> {
        let order_id = self
            .store
            .create(&req)
            .await
            .map_err(|e| e.context("create"))?;

        info!(order_id, user_id = req.user_id, items = req.items.len(), "order saved");

        let order = Order::from_request(order_id, req);
        publish_json(self.publisher.as_ref(), topics::SAVED_ORDERS, order_id, &order)
            .await
            .map_err(|e| ServiceError::from(e).context("send saved order"))?;

        Ok(order_id)
    }

    pub async fn delete(&self, order_id: i64) -> Result<(), ServiceError> {
        let deleted = self
            .store
            .delete(order_id)
            .await
            .map_err(|e| e.context("delete"))?;

        if deleted {
            info!(order_id, "order deleted");
        } else {
            debug!(order_id, "no order to delete");
        }
        Ok(())
    }

    /// Re-emits the stored order on `paid_orders`.
    pub async fn send_paid_order(&self, order_id: i64) -> Result<(), ServiceError> {
        let order = self
            .store
            .get(order_id)
            .await
            .map_err(|e| e.context("get"))?;

        publish_json(self.publisher.as_ref(), topics::PAID_ORDERS, order_id, &order)
            .await
            .map_err(|e| ServiceError::from(e).context("send paid order"))
    }
}
