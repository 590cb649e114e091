//! Per-account key/value settings.
//!
//! The monitor liveness keys hold unix seconds as strings. The heartbeat key is only ever moved forward, and the
//! offline downgrade is conditional on the heartbeat still holding the value the sweeper looked at.
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::to_unix;
pub use crate::db_types::setting_keys::*;
use crate::db_types::OnlineState;

pub async fn fetch_setting(
    account_id: i64,
    key: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<String>, sqlx::Error> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT vvalue FROM settings WHERE account_id = $1 AND vkey = $2")
            .bind(account_id)
            .bind(key)
            .fetch_optional(conn)
            .await?;
    Ok(value.flatten())
}

/// Fetches several settings for one account at once. Keys that are not set are absent from the map.
pub async fn fetch_settings(
    account_id: i64,
    keys: &[&str],
    conn: &mut SqliteConnection,
) -> Result<HashMap<String, String>, sqlx::Error> {
    let rows: Vec<(String, Option<String>)> =
        sqlx::query_as("SELECT vkey, vvalue FROM settings WHERE account_id = $1").bind(account_id).fetch_all(conn).await?;
    let result = rows
        .into_iter()
        .filter(|(k, _)| keys.contains(&k.as_str()))
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect();
    Ok(result)
}

pub async fn upsert_setting(
    account_id: i64,
    key: &str,
    value: &str,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO settings (account_id, vkey, vvalue) VALUES ($1, $2, $3)
        ON CONFLICT (account_id, vkey) DO UPDATE SET vvalue = excluded.vvalue
        "#,
    )
    .bind(account_id)
    .bind(key)
    .bind(value)
    .execute(conn)
    .await?;
    Ok(())
}

/// Moves the stored heartbeat forward to `now`. Returns `false` if a later heartbeat was already stored, in which case
/// nothing is written. Missing and unparsable stored values are always overwritten.
pub async fn advance_heartbeat(
    account_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO settings (account_id, vkey, vvalue) VALUES ($1, $2, $3)
        ON CONFLICT (account_id, vkey) DO UPDATE SET vvalue = excluded.vvalue
        WHERE settings.vvalue IS NULL OR CAST(settings.vvalue AS INTEGER) <= CAST(excluded.vvalue AS INTEGER)
        "#,
    )
    .bind(account_id)
    .bind(LAST_HEARTBEAT)
    .bind(to_unix(now).to_string())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Sets the online flag to offline if, and only if, the stored heartbeat is still `observed_heartbeat`. A `None`
/// observation matches a missing heartbeat.
pub async fn mark_offline_if_unchanged(
    account_id: i64,
    observed_heartbeat: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO settings (account_id, vkey, vvalue)
        SELECT $1, $2, $3
        WHERE (SELECT vvalue FROM settings WHERE account_id = $1 AND vkey = $4) IS $5
        ON CONFLICT (account_id, vkey) DO UPDATE SET vvalue = excluded.vvalue
        "#,
    )
    .bind(account_id)
    .bind(ONLINE_FLAG)
    .bind(OnlineState::Offline.as_flag())
    .bind(LAST_HEARTBEAT)
    .bind(observed_heartbeat)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn accounts_with_setting(key: &str, conn: &mut SqliteConnection) -> Result<Vec<i64>, sqlx::Error> {
    let accounts = sqlx::query_scalar("SELECT account_id FROM settings WHERE vkey = $1 ORDER BY account_id")
        .bind(key)
        .fetch_all(conn)
        .await?;
    Ok(accounts)
}
