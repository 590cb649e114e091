//! #  Database management and control.
//!
//! This module provides the interface contracts that reconciliation engine database *backends* must satisfy.
//!
//! ## Accounts and monitors
//! Every merchant account owns a set of static payment codes, one per payment network, and a monitor agent that
//! reports heartbeats and captured payments. Per-account state lives in a key/value settings store: the shared secret,
//! the last heartbeat and payment instants, the online flag, and an optional order timeout override.
//!
//! ## Traits
//! * [`PaymentGatewayDatabase`] is the umbrella trait a backend implements to drive the engine.
//! * [`MerchantManagement`] resolves external merchant identifiers and reads per-account configuration.
//! * [`MonitorManagement`] records heartbeats and payment markers and performs the conditional offline downgrade.
//! * [`OrderManagement`] stores orders, performs guarded status transitions and manages amount locks.
mod merchant_management;
mod monitor_management;
mod order_management;
mod payment_gateway_database;

pub use merchant_management::MerchantManagement;
pub use monitor_management::MonitorManagement;
pub use order_management::OrderManagement;
pub use payment_gateway_database::{PaymentGatewayDatabase, PaymentGatewayError};
