//! # Reconciliation engine public API
//!
//! The `pe_api` module exposes the programmatic API for the engine.
//!
//! * [`monitor_api`] handles the two messages monitor agents send: heartbeats and payment pushes. It verifies their
//!   signatures, resolves the merchant they belong to, and tracks monitor liveness.
//! * [`order_flow_api`] matches reported payments to pending orders and reclaims orders that were never paid.
//!
//! # API usage
//!
//! An API instance is created by supplying a database backend that implements the backend traits it needs.
//!
//! ```rust,ignore
//! use paycode_engine::{events::EventProducers, MonitorApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/paycode_store.db", 25).await?;
//! let api = MonitorApi::new(db, EventProducers::default());
//! let account_id = api.process_heartbeat(&heartbeat, Utc::now()).await?;
//! ```
pub mod errors;
pub mod monitor_api;
pub mod monitor_objects;
pub mod order_flow_api;
pub mod order_objects;
