use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use shared::ServiceError;
use tokio::sync::Mutex;

use crate::models::Notification;
use crate::store::{day_bounds, NotificationStore};

#[derive(Default)]
pub struct InMemoryNotificationStore {
    rows: Mutex<Vec<Notification>>,
    fail: AtomicBool,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ServiceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::Internal("database unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn create(
        &self,
        order_id: i64,
        user_id: i64,
        ts: DateTime<Utc>,
    ) -> Result<i64, ServiceError> {
        self.check()?;
        let mut rows = self.rows.lock().await;
        let id = rows.len() as i64 + 1;
        rows.push(Notification {
            id,
            order_id,
            user_id,
            ts,
        });
        Ok(id)
    }

    async fn due_on(&self, date: NaiveDate) -> Result<Vec<Notification>, ServiceError> {
        self.check()?;
        let (start, end) = day_bounds(date);
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|n| n.ts >= start && n.ts < end)
            .cloned()
            .collect())
    }

    async fn for_order(&self, order_id: i64) -> Result<Vec<Notification>, ServiceError> {
        self.check()?;
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|n| n.order_id == order_id)
            .cloned()
            .collect())
    }
}
