//! Server configuration.
//!
//! Everything is read from environment variables. Invalid values are reported and replaced by their defaults, so a
//! typo never stops the server from starting, but it does show up in the logs.
use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::*;
use paycode_common::parse_boolean_flag;
use paycode_engine::{db_types::is_valid_order_timeout, db_url, DEFAULT_DATABASE_URL};

const DEFAULT_PAYCODE_HOST: &str = "127.0.0.1";
const DEFAULT_PAYCODE_PORT: u16 = 8360;
const DEFAULT_BOOTSTRAP_ACCOUNT_ID: i64 = 1;
const DEFAULT_ORDER_TIMEOUT_MINUTES: i64 = 5;
const DEFAULT_RECLAIM_BATCH_LIMIT: i64 = 100;
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const MAX_SWEEP_INTERVAL_SECS: u64 = 86_400;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The account that monitor messages without an `appid` are attributed to.
    pub bootstrap_account_id: i64,
    pub scheduler: SchedulerConfig,
    /// Whether payments that match no order are saved for operator review.
    pub record_unmatched: bool,
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Minutes before an unpaid order is closed, for accounts without their own override.
    pub order_timeout_minutes: i64,
    /// Maximum number of orders closed per account on each reclaim pass.
    pub reclaim_batch_limit: i64,
    /// Time between passes of each scheduler loop.
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            order_timeout_minutes: DEFAULT_ORDER_TIMEOUT_MINUTES,
            reclaim_batch_limit: DEFAULT_RECLAIM_BATCH_LIMIT,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_PAYCODE_HOST.to_string(),
            port: DEFAULT_PAYCODE_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            bootstrap_account_id: DEFAULT_BOOTSTRAP_ACCOUNT_ID,
            scheduler: SchedulerConfig::default(),
            record_unmatched: true,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("PAYCODE_HOST").ok().unwrap_or_else(|| DEFAULT_PAYCODE_HOST.into());
        let port = env_or_default("PAYCODE_PORT", DEFAULT_PAYCODE_PORT, |_| true);
        let database_url = db_url();
        let bootstrap_account_id =
            env_or_default("PAYCODE_BOOTSTRAP_ACCOUNT_ID", DEFAULT_BOOTSTRAP_ACCOUNT_ID, |v| *v > 0);
        let order_timeout_minutes =
            env_or_default("PAYCODE_ORDER_TIMEOUT", DEFAULT_ORDER_TIMEOUT_MINUTES, |v| is_valid_order_timeout(*v));
        let reclaim_batch_limit = env_or_default("PAYCODE_RECLAIM_BATCH_LIMIT", DEFAULT_RECLAIM_BATCH_LIMIT, |v| *v > 0);
        let interval_secs = env_or_default("PAYCODE_SWEEP_INTERVAL", DEFAULT_SWEEP_INTERVAL.as_secs(), |v| {
            (1..=MAX_SWEEP_INTERVAL_SECS).contains(v)
        });
        let record_unmatched = parse_boolean_flag(env::var("PAYCODE_RECORD_UNMATCHED").ok(), true);
        let scheduler = SchedulerConfig {
            order_timeout_minutes,
            reclaim_batch_limit,
            interval: Duration::from_secs(interval_secs),
        };
        Self { host, port, database_url, bootstrap_account_id, scheduler, record_unmatched }
    }
}

/// Reads and parses `name`, falling back to `default` if the variable is unset, unparsable, or rejected by `valid`.
fn env_or_default<T, F>(name: &str, default: T, valid: F) -> T
where
    T: FromStr + Display + Copy,
    T::Err: Display,
    F: Fn(&T) -> bool,
{
    let Ok(s) = env::var(name) else {
        return default;
    };
    match s.trim().parse::<T>() {
        Ok(v) if valid(&v) => v,
        Ok(v) => {
            error!("🪛️ {v} is out of range for {name}. Using the default, {default}, instead.");
            default
        },
        Err(e) => {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        },
    }
}
