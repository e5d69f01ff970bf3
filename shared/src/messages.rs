use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Product with its requested quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub product_id: i64,
    pub quantity: i32,
}

/// Inbound request on `new_orders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrderReq {
    pub user_id: i64,
    pub items: Vec<Item>,
    pub delivery_date: DateTime<Utc>,
    pub email: String,
    pub total: f64,
}

/// Full order payload carried on `saved_orders`, `reserved_orders` and `paid_orders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: i64,
    pub user_id: i64,
    pub total: f64,
    pub delivery_date: DateTime<Utc>,
    pub email: String,
    pub items: Vec<Item>,
}

impl Order {
    pub fn from_request(order_id: i64, req: CreateOrderReq) -> Self {
        Self {
            order_id,
            user_id: req.user_id,
            total: req.total,
            delivery_date: req.delivery_date,
            email: req.email,
            items: req.items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetMsg {
    pub order_id: i64,
    pub err_msg: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelMsg {
    pub order_id: i64,
    pub reason: String,
}

/// External payment confirmation on `receipts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub order_id: i64,
}

/// Payload of `pending_payments` and `paid_payments`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub order_id: i64,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailNotification {
    pub order_id: i64,
    pub user_id: i64,
}

/// Trigger on `check`; carries no data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReq {}

/// Required-field checks applied after a message is decoded.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

fn required_id(name: &str, v: i64) -> Result<(), String> {
    if v <= 0 {
        return Err(format!("{name} is required"));
    }
    Ok(())
}

fn required_str(name: &str, v: &str) -> Result<(), String> {
    if v.trim().is_empty() {
        return Err(format!("{name} is required"));
    }
    Ok(())
}

fn required_total(v: f64) -> Result<(), String> {
    if !v.is_finite() || v == 0.0 {
        return Err("total is required".to_string());
    }
    Ok(())
}

fn required_items(items: &[Item]) -> Result<(), String> {
    if items.is_empty() {
        return Err("items is required".to_string());
    }
    items
        .iter()
        .try_for_each(|item| required_id("items.product_id", item.product_id))
}

impl Validate for CreateOrderReq {
    fn validate(&self) -> Result<(), String> {
        required_id("user_id", self.user_id)?;
        required_items(&self.items)?;
        required_str("email", &self.email)?;
        required_total(self.total)
    }
}

impl Validate for Order {
    fn validate(&self) -> Result<(), String> {
        required_id("order_id", self.order_id)?;
        required_id("user_id", self.user_id)?;
        required_items(&self.items)?;
        required_str("email", &self.email)?;
        required_total(self.total)
    }
}

impl Validate for ResetMsg {
    fn validate(&self) -> Result<(), String> {
        required_id("order_id", self.order_id)?;
        required_str("err_msg", &self.err_msg)
    }
}

impl Validate for CancelMsg {
    fn validate(&self) -> Result<(), String> {
        required_id("order_id", self.order_id)?;
        required_str("reason", &self.reason)
    }
}

impl Validate for Receipt {
    fn validate(&self) -> Result<(), String> {
        required_id("order_id", self.order_id)
    }
}

impl Validate for PaymentEvent {
    fn validate(&self) -> Result<(), String> {
        required_id("order_id", self.order_id)
    }
}

impl Validate for EmailNotification {
    fn validate(&self) -> Result<(), String> {
        required_id("order_id", self.order_id)?;
        required_id("user_id", self.user_id)
    }
}

impl Validate for CheckReq {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Decodes a JSON payload and checks its required fields.
pub fn decode<T: DeserializeOwned + Validate>(raw: &[u8]) -> Result<T, ServiceError> {
    let msg: T = serde_json::from_slice(raw)
        .map_err(|e| ServiceError::InvalidMessage(format!("unmarshal: {e}")))?;
    msg.validate()
        .map_err(|e| ServiceError::InvalidMessage(format!("validate: {e}")))?;
    Ok(msg)
}
