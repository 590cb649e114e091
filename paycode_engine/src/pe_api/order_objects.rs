use serde::{Deserialize, Serialize};

use crate::db_types::Order;

/// The result of reclaiming one batch of expired orders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimResult {
    /// Orders that were closed by this batch, as they are after closing.
    pub closed: Vec<Order>,
    /// Orders that left pending (paid, most likely) between selection and closing.
    pub superseded: usize,
    /// Orders that could not be closed because of a storage error. They stay pending and are retried next time.
    pub failed: usize,
}

impl ReclaimResult {
    pub fn closed_count(&self) -> usize {
        self.closed.len()
    }
}

/// The result of reclaiming expired orders across all accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimSummary {
    pub accounts: usize,
    pub closed: Vec<Order>,
    pub superseded: usize,
    pub failed: usize,
    /// Accounts whose batch could not run at all.
    pub failed_accounts: usize,
    pub purged_locks: u64,
}

impl ReclaimSummary {
    pub fn closed_count(&self) -> usize {
        self.closed.len()
    }

    pub fn absorb(&mut self, batch: ReclaimResult) {
        self.closed.extend(batch.closed);
        self.superseded += batch.superseded;
        self.failed += batch.failed;
    }
}
