use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{NewUnmatchedPayment, Order};

/// An order moved from pending to paid because a monitor reported a matching payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// An order was closed by the reclaimer because it was not paid in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderExpiredEvent {
    pub order: Order,
    pub closed_at: DateTime<Utc>,
}

impl OrderExpiredEvent {
    pub fn new(order: Order, closed_at: DateTime<Utc>) -> Self {
        Self { order, closed_at }
    }
}

/// A verified payment arrived that could not be tied to any pending order. Someone probably paid the wrong amount, or
/// paid after their order was reclaimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentUnmatchedEvent {
    pub payment: NewUnmatchedPayment,
}

impl PaymentUnmatchedEvent {
    pub fn new(payment: NewUnmatchedPayment) -> Self {
        Self { payment }
    }
}
