use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use shared::{PaymentStatus, ServiceError};
use tokio::sync::Mutex;

use crate::models::Payment;
use crate::store::{plan, PaymentStore, Transition};

/// Process-local [`PaymentStore`].
#[derive(Default)]
pub struct InMemoryPaymentStore {
    payments: Mutex<HashMap<i64, Payment>>,
    fail: AtomicBool,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn status(&self, order_id: i64) -> Option<PaymentStatus> {
        self.payments.lock().await.get(&order_id).map(|p| p.status)
    }

    fn check(&self) -> Result<(), ServiceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::Internal("database unavailable".to_string()));
        }
        Ok(())
    }

    async fn transition(
        &self,
        order_id: i64,
        next: PaymentStatus,
    ) -> Result<Option<Payment>, ServiceError> {
        self.check()?;
        let mut payments = self.payments.lock().await;
        let current = payments.get(&order_id).map(|p| p.status);

        match plan(order_id, current, next)? {
            Transition::Skip => Ok(None),
            Transition::Apply => Ok(payments.get_mut(&order_id).map(|payment| {
                payment.status = next;
                payment.clone()
            })),
        }
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn add(&self, order_id: i64, user_id: i64, total: f64) -> Result<Payment, ServiceError> {
        self.check()?;
        let mut payments = self.payments.lock().await;
        if payments.contains_key(&order_id) {
            return Err(ServiceError::Conflict(format!(
                "payment for order {order_id} already exists"
            )));
        }

        let payment = Payment {
            order_id,
            user_id,
            total,
            status: PaymentStatus::Pending,
        };
        payments.insert(order_id, payment.clone());
        Ok(payment)
    }

    async fn get(&self, order_id: i64) -> Result<Payment, ServiceError> {
        self.check()?;
        self.payments
            .lock()
            .await
            .get(&order_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("payment for order {order_id}")))
    }

    async fn approve(&self, order_id: i64) -> Result<Payment, ServiceError> {
        self.transition(order_id, PaymentStatus::Paid)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("payment for order {order_id}")))
    }

    async fn cancel(&self, order_id: i64) -> Result<Option<Payment>, ServiceError> {
        self.transition(order_id, PaymentStatus::Cancelled).await
    }
}
