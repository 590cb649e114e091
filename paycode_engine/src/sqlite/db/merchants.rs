use log::debug;
use sqlx::SqliteConnection;

const ACTIVE: i32 = 1;

/// Only active mappings resolve.
pub async fn fetch_account_id_for_app_id(app_id: &str, conn: &mut SqliteConnection) -> Result<Option<i64>, sqlx::Error> {
    let account_id = sqlx::query_scalar("SELECT account_id FROM merchant_mappings WHERE app_id = $1 AND status = $2")
        .bind(app_id)
        .bind(ACTIVE)
        .fetch_optional(conn)
        .await?;
    Ok(account_id)
}

/// Creates or replaces the mapping from `app_id` to `account_id`.
pub async fn upsert_mapping(
    app_id: &str,
    account_id: i64,
    active: bool,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO merchant_mappings (app_id, account_id, status) VALUES ($1, $2, $3)
        ON CONFLICT (app_id) DO UPDATE SET account_id = excluded.account_id, status = excluded.status
        "#,
    )
    .bind(app_id)
    .bind(account_id)
    .bind(if active { ACTIVE } else { 0 })
    .execute(conn)
    .await?;
    debug!("🗃️ Merchant mapping {app_id} -> #{account_id} saved (active: {active})");
    Ok(())
}
