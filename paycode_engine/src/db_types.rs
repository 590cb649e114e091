use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::warn;
use paycode_common::Amount;
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

/// A monitor that has not sent a verified heartbeat for this many seconds is considered offline.
pub const HEARTBEAT_TIMEOUT_SECS: i64 = 180;

/// The longest order timeout accepted from configuration or account settings (one year).
pub const MAX_ORDER_TIMEOUT_MINUTES: i64 = 525_600;

/// Order timeouts must be positive and no longer than [`MAX_ORDER_TIMEOUT_MINUTES`].
pub fn is_valid_order_timeout(minutes: i64) -> bool {
    (1..=MAX_ORDER_TIMEOUT_MINUTES).contains(&minutes)
}

/// Keys of the per-account settings store. The values are shared with merchant tooling, so the names are fixed.
pub mod setting_keys {
    /// The shared secret used to sign monitor messages.
    pub const SECRET_KEY: &str = "key";
    /// Unix seconds of the last verified heartbeat.
    pub const LAST_HEARTBEAT: &str = "lastheart";
    /// Unix seconds of the last verified payment push.
    pub const LAST_PAYMENT: &str = "lastpay";
    /// "1" while the monitor is online, "0" otherwise.
    pub const ONLINE_FLAG: &str = "jkstate";
    /// Order timeout override in minutes.
    pub const ORDER_TIMEOUT: &str = "close";
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid {kind}: {value}")]
pub struct ConversionError {
    kind: &'static str,
    value: String,
}

impl ConversionError {
    fn new<S: Display>(kind: &'static str, value: S) -> Self {
        Self { kind, value: value.to_string() }
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
/// The lifecycle state of an order. The integer codes are stored in the database and are part of the wire contract
/// with merchant tooling, so they must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[repr(i32)]
pub enum OrderStatusType {
    /// The order was not paid in time and has been closed. Its amount lock has been released.
    Closed = -1,
    /// The order is waiting for a payment to be reported.
    Pending = 0,
    /// A reported payment was matched to the order.
    Paid = 1,
    /// The order was paid, but the merchant could not be notified. Set by downstream notifiers, never by this engine.
    NotifyFailed = 2,
}

/// Things that can happen to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderEvent {
    PaymentMatched,
    Expired,
    NotificationFailed,
}

impl OrderEvent {
    /// The only status from which this event may be applied.
    pub fn source_status(&self) -> OrderStatusType {
        match self {
            OrderEvent::PaymentMatched | OrderEvent::Expired => OrderStatusType::Pending,
            OrderEvent::NotificationFailed => OrderStatusType::Paid,
        }
    }

    /// The timestamp column that gets stamped when the event is applied, if any.
    pub fn timestamp_column(&self) -> Option<&'static str> {
        match self {
            OrderEvent::PaymentMatched => Some("paid_at"),
            OrderEvent::Expired => Some("closed_at"),
            OrderEvent::NotificationFailed => None,
        }
    }
}

impl OrderStatusType {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// Returns the status an order moves to when `event` happens in this status, or `None` if the transition is not
    /// allowed.
    pub fn apply(self, event: OrderEvent) -> Option<OrderStatusType> {
        use OrderEvent::*;
        use OrderStatusType::*;
        match (self, event) {
            (Pending, PaymentMatched) => Some(Paid),
            (Pending, Expired) => Some(Closed),
            (Paid, NotificationFailed) => Some(NotifyFailed),
            (Pending, NotificationFailed) => None,
            (Paid | Closed | NotifyFailed, PaymentMatched | Expired) => None,
            (Closed | NotifyFailed, NotificationFailed) => None,
        }
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Closed => write!(f, "Closed"),
            OrderStatusType::Pending => write!(f, "Pending"),
            OrderStatusType::Paid => write!(f, "Paid"),
            OrderStatusType::NotifyFailed => write!(f, "NotifyFailed"),
        }
    }
}

impl TryFrom<i32> for OrderStatusType {
    type Error = ConversionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Closed),
            0 => Ok(Self::Pending),
            1 => Ok(Self::Paid),
            2 => Ok(Self::NotifyFailed),
            v => Err(ConversionError::new("order status", v)),
        }
    }
}

//--------------------------------------     PaymentKind       ---------------------------------------------------------
/// The payment network a static code (and therefore a payment) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[repr(i32)]
pub enum PaymentKind {
    Wechat = 1,
    Alipay = 2,
}

impl PaymentKind {
    pub fn code(&self) -> i32 {
        *self as i32
    }
}

impl Display for PaymentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentKind::Wechat => write!(f, "Wechat"),
            PaymentKind::Alipay => write!(f, "Alipay"),
        }
    }
}

impl TryFrom<i32> for PaymentKind {
    type Error = ConversionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Wechat),
            2 => Ok(Self::Alipay),
            v => Err(ConversionError::new("payment kind", v)),
        }
    }
}

/// Parses the numeric kind code that monitor agents send in the `type` field.
impl FromStr for PaymentKind {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().parse::<i32>().map_err(|_| ConversionError::new("payment kind", s))?;
        Self::try_from(code)
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    /// The merchant-visible order code. Amount locks are keyed on this.
    pub order_code: String,
    pub account_id: i64,
    pub kind: PaymentKind,
    pub requested_amount: Amount,
    /// What the customer is expected to pay. The allocator may have nudged this away from `requested_amount` so that
    /// no two pending orders share an amount.
    pub actual_amount: Amount,
    pub status: OrderStatusType,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Which of the two order amounts a payment is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountField {
    Actual,
    Requested,
}

impl AmountField {
    pub fn column(&self) -> &'static str {
        match self {
            AmountField::Actual => "actual_amount",
            AmountField::Requested => "requested_amount",
        }
    }
}

//--------------------------------------       NewOrder        ---------------------------------------------------------
/// A freshly allocated order. The creation time is stamped here, when the order is built, rather than by the storage
/// layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub order_code: String,
    pub account_id: i64,
    pub kind: PaymentKind,
    pub requested_amount: Amount,
    pub actual_amount: Amount,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new<S: Into<String>>(
        order_code: S,
        account_id: i64,
        kind: PaymentKind,
        requested_amount: Amount,
        actual_amount: Amount,
    ) -> Self {
        Self {
            order_code: order_code.into(),
            account_id,
            kind,
            requested_amount,
            actual_amount,
            created_at: Utc::now(),
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

//--------------------------------------     OnlineState       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnlineState {
    /// No usable heartbeat has ever been recorded.
    Unknown,
    Online,
    Offline,
}

impl OnlineState {
    /// The value stored in the `jkstate` account setting. Unknown and Offline share a representation.
    pub fn as_flag(&self) -> &'static str {
        match self {
            OnlineState::Online => "1",
            OnlineState::Offline | OnlineState::Unknown => "0",
        }
    }
}

impl Display for OnlineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OnlineState::Unknown => write!(f, "Unknown"),
            OnlineState::Online => write!(f, "Online"),
            OnlineState::Offline => write!(f, "Offline"),
        }
    }
}

//--------------------------------------    MonitorRecord      ---------------------------------------------------------
/// The raw liveness settings for an account, exactly as persisted. Timestamps are unix seconds stored as strings and
/// may be missing or garbage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorRecord {
    pub account_id: i64,
    pub last_heartbeat: Option<String>,
    pub last_payment: Option<String>,
    pub state_flag: Option<String>,
}

impl MonitorRecord {
    pub fn last_heartbeat_at(&self) -> Option<DateTime<Utc>> {
        parse_unix_timestamp(self.last_heartbeat.as_deref())
    }

    pub fn last_payment_at(&self) -> Option<DateTime<Utc>> {
        parse_unix_timestamp(self.last_payment.as_deref())
    }

    pub fn is_flagged_online(&self) -> bool {
        self.state_flag.as_deref() == Some(OnlineState::Online.as_flag())
    }

    /// True when the heartbeat is missing, unparsable, or at least `timeout_secs` old as of `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, timeout_secs: i64) -> bool {
        match self.last_heartbeat_at() {
            Some(t) => (now - t).num_seconds() >= timeout_secs,
            None => true,
        }
    }

    /// Derives the liveness state as of `now`. A stored online flag is only trusted while the heartbeat is fresh.
    pub fn status_at(&self, now: DateTime<Utc>, timeout_secs: i64) -> MonitorStatus {
        let last_heartbeat_at = self.last_heartbeat_at();
        let online_state = match last_heartbeat_at {
            None => OnlineState::Unknown,
            Some(_) if self.is_flagged_online() && !self.is_stale(now, timeout_secs) => OnlineState::Online,
            Some(_) => OnlineState::Offline,
        };
        MonitorStatus {
            account_id: self.account_id,
            online_state,
            last_heartbeat_at,
            last_payment_at: self.last_payment_at(),
        }
    }
}

fn parse_unix_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    match value.parse::<i64>() {
        Ok(secs) if secs > 0 => DateTime::from_timestamp(secs, 0),
        _ => {
            warn!("Ignoring unparsable timestamp setting: {value}");
            None
        },
    }
}

//--------------------------------------    MonitorStatus      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub account_id: i64,
    pub online_state: OnlineState,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub last_payment_at: Option<DateTime<Utc>>,
}

//--------------------------------------   UnmatchedPayment    ---------------------------------------------------------
/// A verified payment report for which no pending order could be found. Kept for operator review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUnmatchedPayment {
    pub account_id: i64,
    pub kind: PaymentKind,
    pub amount: Amount,
    /// The timestamp string the monitor agent sent, verbatim.
    pub reported_at: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedPayment {
    pub id: i64,
    pub account_id: i64,
    pub kind: PaymentKind,
    pub amount: Amount,
    pub reported_at: String,
    pub received_at: DateTime<Utc>,
}
