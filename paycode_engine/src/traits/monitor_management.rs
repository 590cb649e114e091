use chrono::{DateTime, Utc};

use crate::{db_types::MonitorRecord, traits::PaymentGatewayError};

/// Persistence for monitor liveness and payment markers.
#[allow(async_fn_in_trait)]
pub trait MonitorManagement {
    /// Stores `now` as the last heartbeat instant for the account and flags the monitor as online, in a single
    /// transaction. The stored instant never moves backwards: if a later heartbeat has already been recorded, the
    /// timestamp is left alone (the account is still flagged online).
    async fn record_heartbeat(&self, account_id: i64, now: DateTime<Utc>) -> Result<(), PaymentGatewayError>;

    /// Stores `now` as the last payment instant for the account. Liveness is not touched.
    async fn record_payment(&self, account_id: i64, now: DateTime<Utc>) -> Result<(), PaymentGatewayError>;

    /// Fetches the raw liveness settings for the account. Accounts that have never reported anything yield an empty
    /// record.
    async fn fetch_monitor_record(&self, account_id: i64) -> Result<MonitorRecord, PaymentGatewayError>;

    /// All accounts that have ever had a heartbeat recorded.
    async fn accounts_with_heartbeat(&self) -> Result<Vec<i64>, PaymentGatewayError>;

    /// Flags the monitor as offline, but only if the stored heartbeat is still `observed_heartbeat` (the value the
    /// caller based its staleness decision on). Returns `false` if a newer heartbeat landed in the meantime, in which
    /// case nothing is written.
    async fn mark_offline(
        &self,
        account_id: i64,
        observed_heartbeat: Option<String>,
    ) -> Result<bool, PaymentGatewayError>;
}
