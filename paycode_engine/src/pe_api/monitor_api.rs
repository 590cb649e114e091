use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use paycode_common::{Amount, Secret};

use crate::{
    db_types::{MonitorStatus, NewUnmatchedPayment, PaymentKind, HEARTBEAT_TIMEOUT_SECS},
    events::{EventProducers, PaymentUnmatchedEvent},
    helpers::{verify_heartbeat, verify_push},
    monitor_objects::{HeartbeatMessage, PushMessage, PushOutcome, SweepOutcome, SweepSummary},
    traits::PaymentGatewayDatabase,
    MonitorApiError,
    OrderFlowApi,
};

/// The account messages without a merchant identifier are attributed to, unless configured otherwise.
pub const DEFAULT_BOOTSTRAP_ACCOUNT_ID: i64 = 1;

/// `MonitorApi` is the entry point for messages from monitor agents.
///
/// Every message is attributed to a merchant account and verified against that account's secret before anything is
/// written. Verified heartbeats keep the monitor marked as online; verified pushes update the last payment marker and
/// are handed to [`OrderFlowApi::match_payment`].
pub struct MonitorApi<B> {
    db: B,
    orders: OrderFlowApi<B>,
    producers: EventProducers,
    bootstrap_account_id: i64,
    record_unmatched: bool,
}

impl<B> Debug for MonitorApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MonitorApi (bootstrap account: #{})", self.bootstrap_account_id)
    }
}

impl<B: Clone> MonitorApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        let orders = OrderFlowApi::new(db.clone(), producers.clone());
        Self { db, orders, producers, bootstrap_account_id: DEFAULT_BOOTSTRAP_ACCOUNT_ID, record_unmatched: true }
    }
}

impl<B> MonitorApi<B> {
    pub fn with_bootstrap_account(mut self, account_id: i64) -> Self {
        self.bootstrap_account_id = account_id;
        self
    }

    /// Whether payments that match no order are persisted for review. They are published as events either way.
    pub fn with_unmatched_recording(mut self, record: bool) -> Self {
        self.record_unmatched = record;
        self
    }

    pub fn with_default_order_timeout(mut self, minutes: i64) -> Self {
        self.orders = self.orders.with_default_order_timeout(minutes);
        self
    }

    pub fn order_flow(&self) -> &OrderFlowApi<B> {
        &self.orders
    }
}

impl<B> MonitorApi<B>
where B: PaymentGatewayDatabase
{
    /// Maps the merchant identifier carried in a message to an account id. A missing or empty identifier means the
    /// bootstrap account. Only active mappings resolve.
    pub async fn resolve_merchant(&self, app_id: Option<&str>) -> Result<i64, MonitorApiError> {
        let app_id = match app_id {
            None | Some("") => return Ok(self.bootstrap_account_id),
            Some(id) => id,
        };
        match self.db.fetch_account_id_for_app_id(app_id).await? {
            Some(account_id) => {
                trace!("💓️ Merchant {app_id} resolved to account #{account_id}");
                Ok(account_id)
            },
            None => {
                debug!("💓️ No active merchant mapping for {app_id}");
                Err(MonitorApiError::UnknownMerchant(app_id.to_string()))
            },
        }
    }

    async fn secret_for(&self, account_id: i64) -> Result<Secret<String>, MonitorApiError> {
        self.db.fetch_secret_key(account_id).await?.ok_or_else(|| {
            error!("💓️ Account #{account_id} has no secret key configured. Its monitor messages cannot be verified.");
            MonitorApiError::SecretNotConfigured(account_id)
        })
    }

    /// Verifies a heartbeat and records it. Returns the account the heartbeat was attributed to.
    pub async fn process_heartbeat(&self, msg: &HeartbeatMessage, now: DateTime<Utc>) -> Result<i64, MonitorApiError> {
        let account_id = self.resolve_merchant(msg.app_id.as_deref()).await?;
        let secret = self.secret_for(account_id).await?;
        verify_heartbeat(&msg.t, &msg.sign, &secret).map_err(|e| {
            info!("💓️ Rejected heartbeat for account #{account_id}. {e}");
            MonitorApiError::from(e)
        })?;
        self.db.record_heartbeat(account_id, now).await?;
        trace!("💓️ Heartbeat recorded for account #{account_id}");
        Ok(account_id)
    }

    /// Verifies a payment push, records the payment marker and tries to match the payment to a pending order.
    ///
    /// Finding no order is not an error. The payment is recorded as unmatched (if enabled) and published.
    pub async fn process_push(&self, msg: &PushMessage, now: DateTime<Utc>) -> Result<PushOutcome, MonitorApiError> {
        let account_id = self.resolve_merchant(msg.app_id.as_deref()).await?;
        let secret = self.secret_for(account_id).await?;
        verify_push(&msg.kind, &msg.price, &msg.t, &msg.sign, &secret).map_err(|e| {
            info!("💓️ Rejected payment push for account #{account_id}. {e}");
            MonitorApiError::from(e)
        })?;
        let kind = msg.kind.parse::<PaymentKind>().map_err(|_| MonitorApiError::InvalidKind(msg.kind.clone()))?;
        let amount = msg.price.parse::<Amount>().map_err(|_| MonitorApiError::InvalidPrice(msg.price.clone()))?;
        self.db.record_payment(account_id, now).await?;
        debug!("💓️ Payment of {amount} ({kind}) reported for account #{account_id}");
        let matched = self.orders.match_payment(account_id, amount, kind, now).await?;
        if matched.is_none() {
            let payment = NewUnmatchedPayment { account_id, kind, amount, reported_at: msg.t.clone(), received_at: now };
            self.handle_unmatched(payment).await;
        }
        Ok(PushOutcome { account_id, kind, amount, matched })
    }

    async fn handle_unmatched(&self, payment: NewUnmatchedPayment) {
        if self.record_unmatched {
            match self.db.record_unmatched_payment(payment.clone()).await {
                Ok(id) => info!(
                    "💓️ Payment of {} ({}) on account #{} saved for review as unmatched payment #{id}",
                    payment.amount, payment.kind, payment.account_id
                ),
                Err(e) => warn!("💓️ Could not save unmatched payment for account #{}. {e}", payment.account_id),
            }
        }
        for emitter in &self.producers.payment_unmatched_producer {
            emitter.publish_event(PaymentUnmatchedEvent::new(payment.clone())).await;
        }
    }

    /// Downgrades the account's monitor to offline if its heartbeat is missing, unparsable, or at least
    /// [`HEARTBEAT_TIMEOUT_SECS`] old. The sweep never marks a monitor online.
    pub async fn sweep_one(&self, account_id: i64, now: DateTime<Utc>) -> Result<SweepOutcome, MonitorApiError> {
        let record = self.db.fetch_monitor_record(account_id).await?;
        if !record.is_stale(now, HEARTBEAT_TIMEOUT_SECS) {
            return Ok(SweepOutcome::Healthy);
        }
        if record.state_flag.is_some() && !record.is_flagged_online() {
            return Ok(SweepOutcome::AlreadyOffline);
        }
        if self.db.mark_offline(account_id, record.last_heartbeat.clone()).await? {
            info!("💓️ Monitor for account #{account_id} has gone offline");
            Ok(SweepOutcome::MarkedOffline)
        } else {
            debug!("💓️ A fresh heartbeat for account #{account_id} arrived during the sweep. Leaving it online.");
            Ok(SweepOutcome::Superseded)
        }
    }

    /// Sweeps every account that has ever sent a heartbeat. A failure on one account is logged and counted, and the
    /// sweep carries on.
    pub async fn sweep_liveness(&self, now: DateTime<Utc>) -> Result<SweepSummary, MonitorApiError> {
        let accounts = self.db.accounts_with_heartbeat().await?;
        let mut summary = SweepSummary::default();
        for account_id in accounts {
            match self.sweep_one(account_id, now).await {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    warn!("💓️ Liveness check for account #{account_id} failed. {e}");
                    summary.record_failure();
                },
            }
        }
        Ok(summary)
    }

    /// The liveness state of the account's monitor as of `now`. Staleness is recomputed here, so a monitor that
    /// stopped reporting shows as offline even if no sweep has run since.
    pub async fn monitor_status(&self, account_id: i64, now: DateTime<Utc>) -> Result<MonitorStatus, MonitorApiError> {
        let record = self.db.fetch_monitor_record(account_id).await?;
        Ok(record.status_at(now, HEARTBEAT_TIMEOUT_SECS))
    }
}
