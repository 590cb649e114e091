use chrono::{DateTime, Utc};

use crate::{
    db_types::{AmountField, NewOrder, NewUnmatchedPayment, Order, OrderEvent, PaymentKind},
    traits::PaymentGatewayError,
};
use paycode_common::Amount;

/// Order storage and the guarded status transitions the reconciliation engine relies on.
///
/// Every transition is conditional on the order still being in the source status of the event. A transition that
/// affects no rows is not an error; it means another actor got there first.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    /// The write path of the external order allocator. Stores a new pending order and returns it.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError>;

    /// Claims the (account, actual amount, kind) slot for the order and stores it, atomically. Fails with
    /// [`PaymentGatewayError::AmountSlotTaken`] if another order already holds the slot, in which case nothing is
    /// written. The order is committed and visible to every other connection by the time this returns.
    async fn insert_order_with_lock(&self, order: NewOrder) -> Result<Order, PaymentGatewayError>;

    async fn fetch_order_by_code(&self, order_code: &str) -> Result<Option<Order>, PaymentGatewayError>;

    /// Finds the most recently created pending order for the account and kind whose `field` equals `amount`. Ties on
    /// creation time are broken by the greatest id.
    async fn fetch_latest_pending_order(
        &self,
        account_id: i64,
        kind: PaymentKind,
        amount: Amount,
        field: AmountField,
    ) -> Result<Option<Order>, PaymentGatewayError>;

    /// Applies `event` to the order, stamping the event's timestamp column with `now`. The update is guarded on the
    /// event's source status. Returns `true` if the order was transitioned.
    async fn transition_order(
        &self,
        order_id: i64,
        event: OrderEvent,
        now: DateTime<Utc>,
    ) -> Result<bool, PaymentGatewayError>;

    /// Pending orders created strictly before `cutoff`, oldest first (ties by id), at most `limit` of them.
    async fn fetch_expired_orders(
        &self,
        account_id: Option<i64>,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, PaymentGatewayError>;

    /// All accounts that currently have at least one pending order.
    async fn accounts_with_pending_orders(&self) -> Result<Vec<i64>, PaymentGatewayError>;

    /// Releases every amount lock held by the order code. Returns the number of locks released.
    async fn release_amount_lock(&self, order_code: &str) -> Result<u64, PaymentGatewayError>;

    /// Deletes amount locks whose order has already left pending. Returns the number of locks deleted.
    async fn purge_orphan_amount_locks(&self) -> Result<u64, PaymentGatewayError>;

    /// Stores a verified payment report that could not be matched to any order. Returns the new record id.
    async fn record_unmatched_payment(&self, payment: NewUnmatchedPayment) -> Result<i64, PaymentGatewayError>;
}
