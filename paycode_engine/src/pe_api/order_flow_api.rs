use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;
use paycode_common::Amount;

use crate::{
    db_types::{is_valid_order_timeout, AmountField, NewOrder, Order, OrderEvent, OrderStatusType, PaymentKind},
    events::{EventProducers, OrderExpiredEvent, OrderPaidEvent},
    order_objects::{ReclaimResult, ReclaimSummary},
    traits::{PaymentGatewayDatabase, PaymentGatewayError},
};

/// Pending orders older than this many minutes are closed, unless the account overrides it.
pub const DEFAULT_ORDER_TIMEOUT_MINUTES: i64 = 5;
/// The look-back window of the read-only expired order listing.
pub const DEFAULT_EXPIRED_LISTING_MINUTES: i64 = 30;

/// `OrderFlowApi` drives the order side of reconciliation: matching reported payments to pending orders, and
/// reclaiming orders that were never paid so that their amounts can be handed out again.
/// The instant `minutes` before `now`. Fails for negative or out-of-range windows rather than panicking.
fn cutoff_before(now: DateTime<Utc>, minutes: i64) -> Result<DateTime<Utc>, PaymentGatewayError> {
    if minutes < 0 {
        return Err(PaymentGatewayError::InvalidTimeout(minutes));
    }
    Duration::try_minutes(minutes)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or(PaymentGatewayError::InvalidTimeout(minutes))
}

pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
    default_order_timeout: i64,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi (timeout: {}m)", self.default_order_timeout)
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, default_order_timeout: DEFAULT_ORDER_TIMEOUT_MINUTES }
    }

    /// Overrides the timeout used for accounts without their own `close` setting. Values outside
    /// `1..=MAX_ORDER_TIMEOUT_MINUTES` are ignored.
    pub fn with_default_order_timeout(mut self, minutes: i64) -> Self {
        if is_valid_order_timeout(minutes) {
            self.default_order_timeout = minutes;
        } else {
            warn!("🔄️ Ignoring out-of-range default order timeout of {minutes} minutes");
        }
        self
    }

    pub fn default_order_timeout(&self) -> i64 {
        self.default_order_timeout
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> OrderFlowApi<B>
where B: PaymentGatewayDatabase
{
    /// The write path for the order allocator. Claims the (account, actual amount, kind) slot and stores the order in
    /// one step, so the order can be matched as soon as this returns.
    ///
    /// Fails with [`PaymentGatewayError::AmountSlotTaken`] if another pending order already holds the slot.
    pub async fn register_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError> {
        let (account_id, amount, kind) = (order.account_id, order.actual_amount, order.kind);
        let order = self.db.insert_order_with_lock(order).await?;
        debug!("🔄️📦️ Order [{}] registered for {amount} ({kind}) on account #{account_id}", order.order_code);
        Ok(order)
    }

    /// Looks for the pending order that `amount` most plausibly pays for, and marks it as paid.
    ///
    /// Orders are searched on their actual (allocated) amount first, and on their requested amount only if nothing
    /// matched. Within a search, the most recently created order wins. The transition is guarded on the order still
    /// being pending, so if a concurrent match or the reclaimer got there first, `None` is returned.
    pub async fn match_payment(
        &self,
        account_id: i64,
        amount: Amount,
        kind: PaymentKind,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, PaymentGatewayError> {
        let mut candidate = None;
        for field in [AmountField::Actual, AmountField::Requested] {
            candidate = self.db.fetch_latest_pending_order(account_id, kind, amount, field).await?;
            if candidate.is_some() {
                break;
            }
        }
        let Some(candidate) = candidate else {
            info!("🔄️💰️ No pending {kind} order for {amount} on account #{account_id}");
            return Ok(None);
        };
        if !self.db.transition_order(candidate.id, OrderEvent::PaymentMatched, now).await? {
            info!(
                "🔄️💰️ Order [{}] left pending before the {amount} payment could be applied to it",
                candidate.order_code
            );
            return Ok(None);
        }
        self.release_lock(&candidate.order_code).await;
        let order = self
            .db
            .fetch_order_by_code(&candidate.order_code)
            .await?
            .ok_or(PaymentGatewayError::OrderIdNotFound(candidate.id))?;
        info!("🔄️💰️ Payment of {amount} ({kind}) matched to order [{}] on account #{account_id}", order.order_code);
        self.call_order_paid_hook(&order).await;
        Ok(Some(order))
    }

    /// Closes pending orders that were created more than `timeout_minutes` before `now`, oldest first, at most `limit`
    /// of them. Pass `None` for `account_id` to reclaim across all accounts with the same timeout.
    ///
    /// A failure on one order is logged and does not stop the rest of the batch.
    pub async fn reclaim_batch(
        &self,
        account_id: Option<i64>,
        limit: i64,
        timeout_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<ReclaimResult, PaymentGatewayError> {
        let cutoff = cutoff_before(now, timeout_minutes)?;
        let expired = self.db.fetch_expired_orders(account_id, cutoff, limit).await?;
        trace!("🔄️⏰️ {} order(s) older than {timeout_minutes}m are candidates for closing", expired.len());
        let mut result = ReclaimResult::default();
        for order in expired {
            match self.db.transition_order(order.id, OrderEvent::Expired, now).await {
                Ok(true) => {
                    self.release_lock(&order.order_code).await;
                    let closed = Order { status: OrderStatusType::Closed, closed_at: Some(now), ..order };
                    debug!("🔄️⏰️ Order [{}] closed after {timeout_minutes}m without payment", closed.order_code);
                    self.call_order_expired_hook(&closed, now).await;
                    result.closed.push(closed);
                },
                Ok(false) => {
                    debug!("🔄️⏰️ Order [{}] left pending before it could be closed", order.order_code);
                    result.superseded += 1;
                },
                Err(e) => {
                    warn!("🔄️⏰️ Could not close order [{}]. It will be retried. {e}", order.order_code);
                    result.failed += 1;
                },
            }
        }
        Ok(result)
    }

    /// Reclaims expired orders for every account that has pending orders, honouring each account's timeout override.
    /// Afterwards, amount locks still held by orders that have left pending are purged.
    pub async fn reclaim_all(&self, limit: i64, now: DateTime<Utc>) -> Result<ReclaimSummary, PaymentGatewayError> {
        let accounts = self.db.accounts_with_pending_orders().await?;
        let mut summary = ReclaimSummary { accounts: accounts.len(), ..Default::default() };
        for account_id in accounts {
            let timeout = self.order_timeout_for(account_id).await;
            match self.reclaim_batch(Some(account_id), limit, timeout, now).await {
                Ok(batch) => summary.absorb(batch),
                Err(e) => {
                    warn!("🔄️⏰️ Reclaiming orders for account #{account_id} failed. {e}");
                    summary.failed_accounts += 1;
                },
            }
        }
        summary.purged_locks = match self.db.purge_orphan_amount_locks().await {
            Ok(n) => n,
            Err(e) => {
                warn!("🔄️⏰️ Could not purge orphaned amount locks. {e}");
                0
            },
        };
        if summary.purged_locks > 0 {
            info!("🔄️⏰️ Purged {} orphaned amount lock(s)", summary.purged_locks);
        }
        Ok(summary)
    }

    /// Lists pending orders older than `minutes` (default 30) without touching them.
    pub async fn expired_orders(
        &self,
        account_id: Option<i64>,
        limit: i64,
        minutes: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Order>, PaymentGatewayError> {
        let minutes = minutes.unwrap_or(DEFAULT_EXPIRED_LISTING_MINUTES);
        let cutoff = cutoff_before(now, minutes)?;
        self.db.fetch_expired_orders(account_id, cutoff, limit).await
    }

    /// The account's `close` override, or the default. Lookup failures fall back to the default.
    pub async fn order_timeout_for(&self, account_id: i64) -> i64 {
        match self.db.fetch_order_timeout(account_id).await {
            Ok(Some(minutes)) => minutes,
            Ok(None) => self.default_order_timeout,
            Err(e) => {
                warn!("🔄️ Could not read the order timeout for account #{account_id}. Using the default. {e}");
                self.default_order_timeout
            },
        }
    }

    async fn release_lock(&self, order_code: &str) {
        // A lock that cannot be released here is picked up by the orphan purge on the next reclaim pass
        if let Err(e) = self.db.release_amount_lock(order_code).await {
            warn!("🔄️ Could not release the amount lock for order [{order_code}]. {e}");
        }
    }

    async fn call_order_paid_hook(&self, order: &Order) {
        for emitter in &self.producers.order_paid_producer {
            debug!("🔄️💰️ Notifying order paid hook subscribers");
            emitter.publish_event(OrderPaidEvent::new(order.clone())).await;
        }
    }

    async fn call_order_expired_hook(&self, order: &Order, closed_at: DateTime<Utc>) {
        for emitter in &self.producers.order_expired_producer {
            debug!("🔄️⏰️ Notifying order expired hook subscribers");
            emitter.publish_event(OrderExpiredEvent::new(order.clone(), closed_at)).await;
        }
    }
}
