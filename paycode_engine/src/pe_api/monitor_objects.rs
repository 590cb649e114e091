use paycode_common::Amount;
use serde::{Deserialize, Serialize};

use crate::db_types::{Order, PaymentKind};

/// A liveness report from a monitor agent. All fields are carried exactly as received, since they are signed as text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    /// The external merchant identifier. Absent or empty means the bootstrap account.
    pub app_id: Option<String>,
    pub t: String,
    pub sign: String,
}

/// A captured payment forwarded by a monitor agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub app_id: Option<String>,
    pub t: String,
    pub sign: String,
    /// The numeric payment kind code, as text
    pub kind: String,
    /// The paid amount as a decimal string, e.g. `"1.01"`
    pub price: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushOutcome {
    pub account_id: i64,
    pub kind: PaymentKind,
    pub amount: Amount,
    /// The order the payment was matched to, already in paid status.
    pub matched: Option<Order>,
}

/// What a liveness sweep did to one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepOutcome {
    /// The heartbeat is fresh. Nothing was written.
    Healthy,
    /// The heartbeat is stale but the monitor was already flagged offline. Nothing was written.
    AlreadyOffline,
    MarkedOffline,
    /// The heartbeat looked stale, but a fresh one arrived before the downgrade could be written.
    Superseded,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub checked: usize,
    pub healthy: usize,
    pub already_offline: usize,
    pub marked_offline: usize,
    pub superseded: usize,
    pub failed: usize,
}

impl SweepSummary {
    pub fn record(&mut self, outcome: SweepOutcome) {
        self.checked += 1;
        match outcome {
            SweepOutcome::Healthy => self.healthy += 1,
            SweepOutcome::AlreadyOffline => self.already_offline += 1,
            SweepOutcome::MarkedOffline => self.marked_offline += 1,
            SweepOutcome::Superseded => self.superseded += 1,
        }
    }

    pub fn record_failure(&mut self) {
        self.checked += 1;
        self.failed += 1;
    }
}
