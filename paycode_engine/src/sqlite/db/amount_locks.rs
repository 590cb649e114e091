//! The amount lock table guarantees that at most one pending order holds a given (account, amount, kind) slot. Locks
//! are taken by the order allocator and released here once the order leaves pending.
use log::debug;
use paycode_common::Amount;
use sqlx::SqliteConnection;

use crate::db_types::{OrderStatusType, PaymentKind};

/// Returns `true` if the slot was free and is now held by `order_code`.
pub async fn acquire(
    account_id: i64,
    amount: Amount,
    kind: PaymentKind,
    order_code: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO amount_locks (account_id, amount, kind, order_code) VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
    )
    .bind(account_id)
    .bind(amount.cents())
    .bind(kind.code())
    .bind(order_code)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn release(order_code: &str, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM amount_locks WHERE order_code = $1").bind(order_code).execute(conn).await?;
    let released = result.rows_affected();
    if released > 0 {
        debug!("🗃️ Released {released} amount lock(s) held by order {order_code}");
    }
    Ok(released)
}

/// Deletes locks held by orders that have already left pending. Locks whose order has not been stored yet are left
/// alone, since a lock can be taken before its order is written.
pub async fn purge_orphans(conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM amount_locks
        WHERE EXISTS (
            SELECT 1 FROM orders o WHERE o.order_code = amount_locks.order_code AND o.status <> $1
        )
        "#,
    )
    .bind(OrderStatusType::Pending.code())
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn fetch_lock_holder(
    account_id: i64,
    amount: Amount,
    kind: PaymentKind,
    conn: &mut SqliteConnection,
) -> Result<Option<String>, sqlx::Error> {
    let holder = sqlx::query_scalar(
        "SELECT order_code FROM amount_locks WHERE account_id = $1 AND amount = $2 AND kind = $3",
    )
    .bind(account_id)
    .bind(amount.cents())
    .bind(kind.code())
    .fetch_optional(conn)
    .await?;
    Ok(holder)
}
