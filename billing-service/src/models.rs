use bigdecimal::BigDecimal;
use diesel::prelude::*;
use num_traits::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use shared::{PaymentEvent, PaymentStatus, ServiceError};

/// A payment as the rest of the system sees it, and as it is cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub order_id: i64,
    pub user_id: i64,
    pub total: f64,
    pub status: PaymentStatus,
}

impl Payment {
    pub fn event(&self) -> PaymentEvent {
        PaymentEvent {
            order_id: self.order_id,
            user_id: self.user_id,
            total: self.total,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::payments)]
pub struct PaymentRow {
    pub order_id: i64,
    pub user_id: i64,
    pub total: BigDecimal,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::payments_statuses)]
pub struct PaymentStatusRow {
    pub order_id: i64,
    pub status: String,
}

impl PaymentRow {
    pub fn new(order_id: i64, user_id: i64, total: f64) -> Result<Self, ServiceError> {
        let total = BigDecimal::from_f64(total)
            .ok_or_else(|| ServiceError::InvalidMessage(format!("total {total} is not a number")))?;
        Ok(Self {
            order_id,
            user_id,
            total,
        })
    }

    pub fn into_payment(self, status: &str) -> Result<Payment, ServiceError> {
        let status = status.parse::<PaymentStatus>().map_err(ServiceError::Internal)?;
        let total = self
            .total
            .to_f64()
            .ok_or_else(|| ServiceError::Internal(format!("total {} out of range", self.total)))?;
        Ok(Payment {
            order_id: self.order_id,
            user_id: self.user_id,
            total,
            status,
        })
    }
}
