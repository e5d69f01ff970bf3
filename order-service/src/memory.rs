use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use shared::{CreateOrderReq, Order, ServiceError};
use tokio::sync::Mutex;

use crate::store::OrderStore;

/// Process-local [`OrderStore`]. Ids start at 1, like a fresh `BIGSERIAL`.
pub struct InMemoryOrderStore {
    orders: Mutex<BTreeMap<i64, Order>>,
    next_id: AtomicI64,
    fail: AtomicBool,
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self {
            orders: Mutex::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            fail: AtomicBool::new(false),
        }
    }
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn exists(&self, order_id: i64) -> bool {
        self.orders.lock().await.contains_key(&order_id)
    }

    fn check(&self) -> Result<(), ServiceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::Internal("database unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, req: &CreateOrderReq) -> Result<i64, ServiceError> {
        self.check()?;

        let mut products = HashSet::with_capacity(req.items.len());
        for item in &req.items {
            if item.quantity <= 0 {
                return Err(ServiceError::FailedPrecondition(
                    "violates check constraint (orders_items_quantity_check)".to_string(),
                ));
            }
            if !products.insert(item.product_id) {
                return Err(ServiceError::FailedPrecondition(
                    "duplicate key value (orders_items_pkey)".to_string(),
                ));
            }
        }

        let mut orders = self.orders.lock().await;
        let order_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut order = Order::from_request(order_id, req.clone());
        order.items.sort_by_key(|item| item.product_id);
        orders.insert(order_id, order);
        Ok(order_id)
    }

    async fn delete(&self, order_id: i64) -> Result<bool, ServiceError> {
        self.check()?;
        Ok(self.orders.lock().await.remove(&order_id).is_some())
    }

    async fn get(&self, order_id: i64) -> Result<Order, ServiceError> {
        self.check()?;
        self.orders
            .lock()
            .await
            .get(&order_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))
    }
}
