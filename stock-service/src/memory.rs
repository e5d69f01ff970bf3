//! Process-local [`StockStore`] with the same constraints as the tables.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use shared::{Item, ServiceError};
use tokio::sync::Mutex;

use crate::models::{ProductQuantity, Reservation};
use crate::store::{check_sufficient, requested, StockStore};

#[derive(Default)]
struct State {
    quantities: HashMap<i64, i32>,
    reservations: BTreeMap<(i64, i64), i32>,
}

#[derive(Default)]
pub struct InMemoryStockStore {
    state: Mutex<State>,
    fail: AtomicBool,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quantities(quantities: impl IntoIterator<Item = (i64, i32)>) -> Self {
        Self {
            state: Mutex::new(State {
                quantities: quantities.into_iter().collect(),
                ..State::default()
            }),
            fail: AtomicBool::new(false),
        }
    }

    pub async fn set_quantity(&self, product_id: i64, quantity: i32) {
        self.state
            .lock()
            .await
            .quantities
            .insert(product_id, quantity);
    }

    /// Makes every operation fail as if the database were unreachable.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ServiceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::Internal("database unavailable".to_string()));
        }
        Ok(())
    }

    async fn remove(&self, order_id: i64, restore: bool) -> Result<Vec<Item>, ServiceError> {
        self.check()?;
        let mut state = self.state.lock().await;

        let keys: Vec<(i64, i64)> = state
            .reservations
            .range((order_id, i64::MIN)..=(order_id, i64::MAX))
            .map(|(key, _)| *key)
            .collect();

        let mut removed = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(quantity) = state.reservations.remove(&key) {
                if restore {
                    *state.quantities.entry(key.1).or_insert(0) += quantity;
                }
                removed.push(Item {
                    product_id: key.1,
                    quantity,
                });
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn reserve(&self, order_id: i64, items: &[Item]) -> Result<(), ServiceError> {
        self.check()?;
        let mut state = self.state.lock().await;

        let wanted = requested(order_id, items)?;
        let available: Vec<ProductQuantity> = wanted
            .keys()
            .filter_map(|id| {
                state.quantities.get(id).map(|quantity| ProductQuantity {
                    product_id: *id,
                    quantity: *quantity,
                })
            })
            .collect();
        check_sufficient(order_id, &wanted, &available)?;

        let mut seen = Vec::with_capacity(items.len());
        for item in items {
            let key = (order_id, item.product_id);
            if state.reservations.contains_key(&key) || seen.contains(&key) {
                return Err(ServiceError::Conflict(format!(
                    "order {order_id} already reserved (reservations_pkey)"
                )));
            }
            if item.quantity <= 0 {
                return Err(ServiceError::FailedPrecondition(
                    "violates check constraint (reservations_quantity_check)".to_string(),
                ));
            }
            seen.push(key);
        }

        for item in items {
            state
                .reservations
                .insert((order_id, item.product_id), item.quantity);
        }
        for (product_id, qty) in wanted {
            if let Some(quantity) = state.quantities.get_mut(&product_id) {
                *quantity -= qty;
            }
        }
        Ok(())
    }

    async fn cancel_reservation(&self, order_id: i64) -> Result<Vec<Item>, ServiceError> {
        self.remove(order_id, true).await
    }

    async fn collect(&self, order_id: i64) -> Result<Vec<Item>, ServiceError> {
        self.remove(order_id, false).await
    }

    async fn quantity(&self, product_id: i64) -> Result<Option<i32>, ServiceError> {
        self.check()?;
        Ok(self.state.lock().await.quantities.get(&product_id).copied())
    }

    async fn reservations(&self, order_id: i64) -> Result<Vec<Reservation>, ServiceError> {
        self.check()?;
        let state = self.state.lock().await;
        Ok(state
            .reservations
            .range((order_id, i64::MIN)..=(order_id, i64::MAX))
            .map(|((order_id, product_id), quantity)| Reservation {
                order_id: *order_id,
                product_id: *product_id,
                quantity: *quantity,
            })
            .collect())
    }
}
