use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use num_traits::{FromPrimitive, ToPrimitive};
use shared::{CreateOrderReq, Item, Order, ServiceError};

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::orders)]
pub struct NewOrder {
    pub user_id: i64,
    pub delivery_date: DateTime<Utc>,
    pub email: String,
    pub total: BigDecimal,
}

impl NewOrder {
    pub fn from_request(req: &CreateOrderReq) -> Result<Self, ServiceError> {
        let total = BigDecimal::from_f64(req.total).ok_or_else(|| {
            ServiceError::InvalidMessage(format!("total {} is not a number", req.total))
        })?;
        Ok(Self {
            user_id: req.user_id,
            delivery_date: req.delivery_date,
            email: req.email.clone(),
            total,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::orders)]
pub struct OrderRow {
    pub order_id: i64,
    pub user_id: i64,
    pub delivery_date: DateTime<Utc>,
    pub email: String,
    pub total: BigDecimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::orders_items)]
pub struct OrderItem {
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i32,
}

impl OrderItem {
    pub fn new(order_id: i64, item: &Item) -> Self {
        Self {
            order_id,
            product_id: item.product_id,
            quantity: item.quantity,
        }
    }
}

impl OrderRow {
    pub fn into_order(self, items: Vec<OrderItem>) -> Result<Order, ServiceError> {
        let total = self
            .total
            .to_f64()
            .ok_or_else(|| ServiceError::Internal(format!("total {} out of range", self.total)))?;
        Ok(Order {
            order_id: self.order_id,
            user_id: self.user_id,
            total,
            delivery_date: self.delivery_date,
            email: self.email,
            items: items
                .into_iter()
                .map(|item| Item {
                    product_id: item.product_id,
                    quantity: item.quantity,
                })
                .collect(),
        })
    }
}
