use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use shared::error::unique_violation;
use shared::{PaymentStatus, ServiceError};

use crate::models::{Payment, PaymentRow, PaymentStatusRow};
use crate::schema::{payments, payments_statuses};

pub type DbPool = bb8::Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts the payment and its `pending` status together.
    async fn add(&self, order_id: i64, user_id: i64, total: f64) -> Result<Payment, ServiceError>;

    async fn get(&self, order_id: i64) -> Result<Payment, ServiceError>;

    /// Moves a pending payment to `paid` and returns it.
    async fn approve(&self, order_id: i64) -> Result<Payment, ServiceError>;

    /// Moves a pending payment to `cancelled`. `None` when there is no payment.
    async fn cancel(&self, order_id: i64) -> Result<Option<Payment>, ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Apply,
    Skip,
}

/// Decides what a status update does given the current status.
pub(crate) fn plan(
    order_id: i64,
    current: Option<PaymentStatus>,
    next: PaymentStatus,
) -> Result<Transition, ServiceError> {
    match (current, next) {
        (Some(from), to) if from.can_transition_to(to) => Ok(Transition::Apply),
        (None, PaymentStatus::Cancelled) => Ok(Transition::Skip),
        (None, _) => Err(ServiceError::NotFound(format!("payment for order {order_id}"))),
        (Some(PaymentStatus::Paid), PaymentStatus::Paid) => Err(ServiceError::Conflict(format!(
            "payment for order {order_id} already paid"
        ))),
        (Some(PaymentStatus::Cancelled | PaymentStatus::Failed), PaymentStatus::Cancelled) => {
            Ok(Transition::Skip)
        }
        (Some(from), to) => Err(ServiceError::FailedPrecondition(format!(
            "payment for order {order_id} is {from}, cannot become {to}"
        ))),
    }
}

pub struct PgPaymentStore {
    pool: DbPool,
}

impl PgPaymentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn transition(
        &self,
        order_id: i64,
        next: PaymentStatus,
    ) -> Result<Option<Payment>, ServiceError> {
        let mut conn = self.pool.get().await.map_err(ServiceError::internal)?;

        conn.build_transaction()
            .read_committed()
            .run::<_, ServiceError, _>(|conn| {
                Box::pin(async move {
                    let current: Option<String> = payments_statuses::table
                        .filter(payments_statuses::order_id.eq(order_id))
                        .select(payments_statuses::status)
                        .for_update()
                        .first(conn)
                        .await
                        .optional()?;

                    let current = current
                        .map(|s| s.parse::<PaymentStatus>().map_err(ServiceError::Internal))
                        .transpose()?;

                    if plan(order_id, current, next)? == Transition::Skip {
                        return Ok(None);
                    }

                    diesel::update(
                        payments_statuses::table.filter(payments_statuses::order_id.eq(order_id)),
                    )
                    .set(payments_statuses::status.eq(next.as_str()))
                    .execute(conn)
                    .await?;

                    let row: PaymentRow = payments::table
                        .filter(payments::order_id.eq(order_id))
                        .select(PaymentRow::as_select())
                        .first(conn)
                        .await?;

                    row.into_payment(next.as_str()).map(Some)
                })
            })
            .await
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn add(&self, order_id: i64, user_id: i64, total: f64) -> Result<Payment, ServiceError> {
        let row = PaymentRow::new(order_id, user_id, total)?;
        let mut conn = self.pool.get().await.map_err(ServiceError::internal)?;

        conn.build_transaction()
            .read_committed()
            .run::<_, ServiceError, _>(|conn| {
                Box::pin(async move {
                    diesel::insert_into(payments::table)
                        .values(&row)
                        .execute(conn)
                        .await
                        .map_err(|e| match unique_violation(&e) {
                            Some(_) => ServiceError::Conflict(format!(
                                "payment for order {order_id} already exists"
                            )),
                            None => ServiceError::from(e),
                        })?;

                    diesel::insert_into(payments_statuses::table)
                        .values(PaymentStatusRow {
                            order_id,
                            status: PaymentStatus::Pending.as_str().to_string(),
                        })
                        .execute(conn)
                        .await?;

                    row.into_payment(PaymentStatus::Pending.as_str())
                })
            })
            .await
    }

    async fn get(&self, order_id: i64) -> Result<Payment, ServiceError> {
        let mut conn = self.pool.get().await.map_err(ServiceError::internal)?;

        let (row, status): (PaymentRow, String) = payments::table
            .inner_join(payments_statuses::table)
            .filter(payments::order_id.eq(order_id))
            .select((PaymentRow::as_select(), payments_statuses::status))
            .first(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| ServiceError::NotFound(format!("payment for order {order_id}")))?;

        row.into_payment(&status)
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
