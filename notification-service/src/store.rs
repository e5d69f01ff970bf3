use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use shared::ServiceError;

use crate::models::{NewNotification, Notification};
use crate::schema::notifications;

pub type DbPool = bb8::Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(
        &self,
        order_id: i64,
        user_id: i64,
        ts: DateTime<Utc>,
    ) -> Result<i64, ServiceError>;

    /// Notifications scheduled on `date` (UTC).
    async fn due_on(&self, date: NaiveDate) -> Result<Vec<Notification>, ServiceError>;

    async fn for_order(&self, order_id: i64) -> Result<Vec<Notification>, ServiceError>;
}

/// `[start, end)` of a UTC calendar day.
pub(crate) fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(chrono::NaiveTime::MIN).and_utc();
    let end = start
        .checked_add_days(Days::new(1))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    (start, end)
}

pub struct PgNotificationStore {
    pool: DbPool,
}

impl PgNotificationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn create(
        &self,
        order_id: i64,
        user_id: i64,
        ts: DateTime<Utc>,
    ) -> Result<i64, ServiceError> {
        let mut conn = self.pool.get().await.map_err(ServiceError::internal)?;

        let id = diesel::insert_into(notifications::table)
            .values(NewNotification {
                order_id,
                user_id,
                ts,
            })
            .returning(notifications::id)
            .get_result(&mut conn)
            .await?;

        Ok(id)
    }

    async fn due_on(&self, date: NaiveDate) -> Result<Vec<Notification>, ServiceError> {
        let (start, end) = day_bounds(date);
        let mut conn = self.pool.get().await.map_err(ServiceError::internal)?;

        let due = notifications::table
            .filter(notifications::ts.ge(start))
            .filter(notifications::ts.lt(end))
            .order(notifications::id)
            .select(Notification::as_select())
            .load(&mut conn)
            .await?;

        Ok(due)
    }

    async fn for_order(&self, order_id: i64) -> Result<Vec<Notification>, ServiceError> {
        let mut conn = self.pool.get().await.map_err(ServiceError::internal)?;

        let rows = notifications::table
            .filter(notifications::order_id.eq(order_id))
            .order(notifications::id)
            .select(Notification::as_select())
            .load(&mut conn)
            .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn day_bounds_cover_one_utc_day() {
        let (start, end) = day_bounds(NaiveDate::from_ymd_opt(2022, 6, 4).unwrap());
        assert_eq!(start, Utc.with_ymd_and_hms(2022, 6, 4, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2022, 6, 5, 0, 0, 0).unwrap());
    }
}
