//! # Paycode server
//! This crate hosts the HTTP server that monitor agents talk to. It is responsible for:
//! * Receiving signed heartbeats and payment pushes from monitor agents and handing them to the reconciliation engine.
//! * Running the background scheduler that reclaims unpaid orders and marks silent monitors as offline.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/monitor/heart` (and the legacy `/appHeart`): heartbeat from a monitor agent. GET query or POST form.
//! * `/monitor/push` (and the legacy `/appPush`): payment push from a monitor agent. GET query or POST form.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod routes;
pub mod scheduler;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
