//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interaction are maintained by simple functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection` argument. Callers can obtain a connection from a pool,
//! or create an atomic transaction as the need arises and call through to the functions without any other changes.
//!
//! Timestamps are stored as unix seconds. In the `settings` table they are stored as strings, since that table is a
//! plain key/value store shared with merchant tooling.
use std::env;

use chrono::{DateTime, Utc};
use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod amount_locks;
pub mod merchants;
pub mod orders;
pub mod settings;
pub mod unmatched;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/paycode_store.db";

pub fn db_url() -> String {
    let result = env::var("PAYCODE_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ PAYCODE_DATABASE_URL is not set. Using the default.");
        DEFAULT_DATABASE_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}

pub(crate) fn to_unix(t: DateTime<Utc>) -> i64 {
    t.timestamp()
}

/// Converts a stored unix timestamp back into a `DateTime`. Zero and `NULL` both mean "not set".
pub(crate) fn from_unix(secs: Option<i64>) -> Option<DateTime<Utc>> {
    match secs {
        Some(s) if s > 0 => DateTime::from_timestamp(s, 0),
        _ => None,
    }
}
