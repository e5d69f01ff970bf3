use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use shared::bus::{publish_json, Publisher};
use shared::{topics, EmailNotification, ServiceError};
use tracing::{error, info};

use crate::store::NotificationStore;

pub struct NotificationEngine {
    store: Arc<dyn NotificationStore>,
    publisher: Arc<dyn Publisher>,
}

impl NotificationEngine {
    pub fn new(store: Arc<dyn NotificationStore>, publisher: Arc<dyn Publisher>) -> Self {
        Self { store, publisher }
    }

    /// Schedules one notification. Repeated calls schedule repeatedly.
    pub async fn create_notification(
        &self,
        order_id: i64,
        user_id: i64,
        ts: DateTime<Utc>,
    ) -> Result<i64, ServiceError> {
        let id = self
            .store
            .create(order_id, user_id, ts)
            .await
            .map_err(|e| e.context("create notification"))?;

        info!(id, order_id, user_id, ts = %ts, "notification scheduled");
        Ok(id)
    }

    /// Sends every notification due today (UTC).
    pub async fn check(&self) -> Result<usize, ServiceError> {
        self.check_on(Utc::now().date_naive()).await
    }

    /// Launches one `email_notifications` send per notification due on
    /// `date` and returns how many were launched. Send failures are logged.
    pub async fn check_on(&self, date: NaiveDate) -> Result<usize, ServiceError> {
        let due = self
            .store
            .due_on(date)
            .await
            .map_err(|e| e.context("get today notifications"))?;

        for notification in &due {
            let publisher = self.publisher.clone();
            let msg = EmailNotification {
                order_id: notification.order_id,
                user_id: notification.user_id,
            };
            tokio::spawn(async move {
                if let Err(e) =
                    publish_json(publisher.as_ref(), topics::EMAIL_NOTIFICATIONS, msg.order_id, &msg)
                        .await
                {
                    error!(order_id = msg.order_id, error = %e, "send email notification");
                }
            });
        }

        info!(date = %date, launched = due.len(), "notifications checked");
        Ok(due.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryNotificationStore;
    use chrono::TimeZone;
    use shared::bus::mock::MockPublisher;
    use std::time::Duration;

    fn engine() -> (NotificationEngine, Arc<InMemoryNotificationStore>, Arc<MockPublisher>) {
        let store = Arc::new(InMemoryNotificationStore::new());
        let publisher = Arc::new(MockPublisher::new());
        (
            NotificationEngine::new(store.clone(), publisher.clone()),
            store,
            publisher,
        )
    }

    #[tokio::test]
    async fn check_sends_only_notifications_due_that_day() {
        let (engine, _, publisher) = engine();
        let june_4 = Utc.with_ymd_and_hms(2022, 6, 4, 9, 30, 0).unwrap();
        let june_5 = Utc.with_ymd_and_hms(2022, 6, 5, 0, 0, 0).unwrap();
        engine.create_notification(1, 7, june_4).await.unwrap();
        engine.create_notification(2, 8, june_5).await.unwrap();

        let launched = engine
            .check_on(NaiveDate::from_ymd_opt(2022, 6, 4).unwrap())
            .await
            .unwrap();
        assert_eq!(launched, 1);

        assert!(publisher
            .wait_for(topics::EMAIL_NOTIFICATIONS, 1, Duration::from_secs(1))
            .await);
        let sent: EmailNotification = publisher.on_topic(topics::EMAIL_NOTIFICATIONS).await[0]
            .decode()
            .unwrap();
        assert_eq!(
            sent,
            EmailNotification {
                order_id: 1,
                user_id: 7
            }
        );
    }

    #[tokio::test]
    async fn notifications_are_not_deduplicated() {
        let (engine, store, _) = engine();
        let ts = Utc.with_ymd_and_hms(2022, 6, 4, 0, 0, 0).unwrap();
        let first = engine.create_notification(1, 7, ts).await.unwrap();
        let second = engine.create_notification(1, 7, ts).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(store.for_order(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn send_failures_do_not_fail_check() {
        let (engine, _, publisher) = engine();
        publisher.set_fail_on_publish(true);
        engine
            .create_notification(1, 7, Utc.with_ymd_and_hms(2022, 6, 4, 0, 0, 0).unwrap())
            .await
            .unwrap();

        let launched = engine
            .check_on(NaiveDate::from_ymd_opt(2022, 6, 4).unwrap())
            .await
            .unwrap();
        assert_eq!(launched, 1);
    }

    #[tokio::test]
    async fn store_failure_fails_check() {
        let (engine, store, _) = engine();
        store.set_failing(true);
        assert_eq!(engine.check().await.unwrap_err().kind(), "internal");
    }
}
