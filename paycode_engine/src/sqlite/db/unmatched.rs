use paycode_common::Amount;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use super::{from_unix, to_unix};
use crate::db_types::{NewUnmatchedPayment, PaymentKind, UnmatchedPayment};

impl FromRow<'_, SqliteRow> for UnmatchedPayment {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let kind = PaymentKind::try_from(row.try_get::<i32, _>("kind")?).map_err(|e| sqlx::Error::Decode(e.into()))?;
        let received_at = from_unix(row.try_get("received_at")?)
            .ok_or_else(|| sqlx::Error::Decode("Unmatched payment has no valid received_at timestamp".into()))?;
        Ok(Self {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            kind,
            amount: Amount::from_cents(row.try_get("amount")?),
            reported_at: row.try_get("reported_at")?,
            received_at,
        })
    }
}

pub async fn insert(payment: NewUnmatchedPayment, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO unmatched_payments (account_id, kind, amount, reported_at, received_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(payment.account_id)
    .bind(payment.kind.code())
    .bind(payment.amount.cents())
    .bind(payment.reported_at)
    .bind(to_unix(payment.received_at))
    .execute(conn)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Unmatched payments for the account, newest first.
pub async fn fetch_for_account(
    account_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<UnmatchedPayment>, sqlx::Error> {
    let payments = sqlx::query_as("SELECT * FROM unmatched_payments WHERE account_id = $1 ORDER BY id DESC")
        .bind(account_id)
        .fetch_all(conn)
        .await?;
    Ok(payments)
}
