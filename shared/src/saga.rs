//! The choreography contract: topic names, who consumes what, and how the
//! stage of an order is derived from the services' local state.

use serde::{Deserialize, Serialize};

pub mod topics {
    pub const NEW_ORDERS: &str = "new_orders";
    pub const SAVED_ORDERS: &str = "saved_orders";
    pub const RESERVED_ORDERS: &str = "reserved_orders";
    pub const RECEIPTS: &str = "receipts";
    pub const PENDING_PAYMENTS: &str = "pending_payments";
    pub const PAID_PAYMENTS: &str = "paid_payments";
    pub const PAID_ORDERS: &str = "paid_orders";
    pub const EMAIL_NOTIFICATIONS: &str = "email_notifications";
    pub const RESET: &str = "reset";
    pub const CANCEL: &str = "cancel";
    pub const CHECK: &str = "check";
}

use topics::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Orders,
    Stock,
    Billing,
    Notifications,
}

impl Service {
    pub fn name(self) -> &'static str {
        match self {
            Service::Orders => "orders",
            Service::Stock => "stock",
            Service::Billing => "billing",
            Service::Notifications => "notifications",
        }
    }

    /// Topics the service subscribes to.
    pub fn consumes(self) -> &'static [&'static str] {
        match self {
            Service::Orders => &[NEW_ORDERS, PAID_PAYMENTS, RESET, CANCEL],
            Service::Stock => &[SAVED_ORDERS, PAID_ORDERS, RESET, CANCEL],
            Service::Billing => &[RESERVED_ORDERS, RECEIPTS, RESET, CANCEL],
            Service::Notifications => &[PAID_ORDERS, CHECK],
        }
    }

    /// Topics the service publishes to.
    pub fn produces(self) -> &'static [&'static str] {
        match self {
            Service::Orders => &[SAVED_ORDERS, PAID_ORDERS],
            Service::Stock => &[RESERVED_ORDERS, RESET],
            Service::Billing => &[PENDING_PAYMENTS, PAID_PAYMENTS, RESET],
            Service::Notifications => &[EMAIL_NOTIFICATIONS],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Cancelled,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// Only `pending` moves, and only to a terminal status.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        self == PaymentStatus::Pending && next.is_terminal()
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(format!("unexpected payment status <{other}>")),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage of one order in the saga. No service stores it; it is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Created,
    Reserved,
    PendingPayment,
    Paid,
    Collected,
    Cancelled,
}

/// What each service knows locally about one order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalView {
    pub order_exists: bool,
    pub reservations: usize,
    pub payment: Option<PaymentStatus>,
    pub notifications: usize,
}

impl Stage {
    /// Derives the stage from the union of local states. Returns `None` when
    /// no service has any trace of the order.
    pub fn observe(view: &LocalView) -> Option<Stage> {
        match view.payment {
            Some(PaymentStatus::Paid) if view.reservations == 0 => Some(Stage::Collected),
            Some(PaymentStatus::Paid) => Some(Stage::Paid),
            Some(PaymentStatus::Cancelled) | Some(PaymentStatus::Failed) => Some(Stage::Cancelled),
            Some(PaymentStatus::Pending) if view.order_exists => Some(Stage::PendingPayment),
            Some(PaymentStatus::Pending) => Some(Stage::Cancelled),
            None if view.reservations > 0 && view.order_exists => Some(Stage::Reserved),
            None if view.order_exists => Some(Stage::Created),
            None if view.reservations > 0 => Some(Stage::Cancelled),
            None => None,
        }
    }

    /// Compensation (`reset`/`cancel`) is only honoured before payment.
    pub fn is_compensable(self) -> bool {
        matches!(self, Stage::Created | Stage::Reserved | Stage::PendingPayment)
    }

    /// Happy-path successor.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Created => Some(Stage::Reserved),
            Stage::Reserved => Some(Stage::PendingPayment),
            Stage::PendingPayment => Some(Stage::Paid),
            Stage::Paid => Some(Stage::Collected),
            Stage::Collected | Stage::Cancelled => None,
        }
    }
}
