//! Paycode Reconciliation Engine
//!
//! A merchant advertises one static payment code per payment network. A static code carries no order reference, so
//! when a monitor agent (a device that watches the merchant's incoming payment notifications) reports a payment, the
//! engine has to work out which pending order the payment belongs to from nothing more than the amount, the payment
//! network and the time it arrived.
//!
//! The library is divided into these sections:
//! 1. Database management and control. SQLite is the supported backend. The backend contracts are defined in
//!    [`mod@traits`], and the data types that cross them live in [`mod@db_types`].
//! 2. The public API ([`mod@pe_api`]):
//!    * [`MonitorApi`] verifies signed heartbeat and push messages from monitor agents, resolves the merchant they
//!      belong to, and tracks whether each monitor is alive.
//!    * [`OrderFlowApi`] matches reported payments to pending orders and reclaims orders that were never paid.
//! 3. Events ([`mod@events`]) that are emitted when orders are paid or expire, or when a payment cannot be matched.
//!    Downstream concerns (merchant notification, operator alerts) subscribe to these rather than living in the
//!    engine.
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod pe_api;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use pe_api::{
    errors::MonitorApiError,
    monitor_api::MonitorApi,
    monitor_objects,
    order_flow_api::OrderFlowApi,
    order_objects,
};
#[cfg(feature = "sqlite")]
pub use sqlite::{
    db::{db_url, DEFAULT_DATABASE_URL},
    SqliteDatabase,
};
