use chrono::{DateTime, Utc};
use log::{debug, trace};
use paycode_common::Amount;
use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, Row, SqliteConnection};

use super::{from_unix, to_unix};
use crate::{
    db_types::{AmountField, NewOrder, Order, OrderEvent, OrderStatusType, PaymentKind},
    traits::PaymentGatewayError,
};

impl FromRow<'_, SqliteRow> for Order {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let kind = PaymentKind::try_from(row.try_get::<i32, _>("kind")?).map_err(|e| sqlx::Error::Decode(e.into()))?;
        let status =
            OrderStatusType::try_from(row.try_get::<i32, _>("status")?).map_err(|e| sqlx::Error::Decode(e.into()))?;
        let created_at = from_unix(row.try_get("created_at")?)
            .ok_or_else(|| sqlx::Error::Decode("Order has no valid created_at timestamp".into()))?;
        Ok(Self {
            id: row.try_get("id")?,
            order_code: row.try_get("order_code")?,
            account_id: row.try_get("account_id")?,
            kind,
            requested_amount: Amount::from_cents(row.try_get("requested_amount")?),
            actual_amount: Amount::from_cents(row.try_get("actual_amount")?),
            status,
            created_at,
            paid_at: from_unix(row.try_get("paid_at")?),
            closed_at: from_unix(row.try_get("closed_at")?),
        })
    }
}

/// Inserts a new pending order. This is not atomic. You can embed this call inside a transaction if you need to ensure
/// atomicity, and pass `&mut *tx` as the connection argument.
///
/// The insert runs to completion before the row is read back, so the write is finished (and, outside a transaction,
/// committed) by the time this returns.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, PaymentGatewayError> {
    let code = order.order_code.clone();
    let result = sqlx::query(
        r#"
            INSERT INTO orders (
                order_code,
                account_id,
                kind,
                requested_amount,
                actual_amount,
                status,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(order.order_code)
    .bind(order.account_id)
    .bind(order.kind.code())
    .bind(order.requested_amount.cents())
    .bind(order.actual_amount.cents())
    .bind(OrderStatusType::Pending.code())
    .bind(to_unix(order.created_at))
    .execute(&mut *conn)
    .await;
    let id = match result {
        Ok(r) => r.last_insert_rowid(),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(PaymentGatewayError::OrderAlreadyExists(code))
        },
        Err(e) => return Err(e.into()),
    };
    let order = fetch_order_by_id(id, conn).await?.ok_or(PaymentGatewayError::OrderIdNotFound(id))?;
    debug!("🗃️ Order [{}] inserted with id {}", order.order_code, order.id);
    Ok(order)
}

pub async fn fetch_order_by_code(order_code: &str, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_code = $1").bind(order_code).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

/// The newest pending order for the account and kind whose `field` column equals `amount`.
pub async fn fetch_latest_pending_order(
    account_id: i64,
    kind: PaymentKind,
    amount: Amount,
    field: AmountField,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let q = format!(
        "SELECT * FROM orders WHERE account_id = $1 AND kind = $2 AND status = $3 AND {} = $4 ORDER BY created_at \
         DESC, id DESC LIMIT 1",
        field.column()
    );
    let order = sqlx::query_as(&q)
        .bind(account_id)
        .bind(kind.code())
        .bind(OrderStatusType::Pending.code())
        .bind(amount.cents())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Applies `event` to the order with a guarded update. Returns `false` if the order was not in the event's source
/// status (including when it does not exist).
pub async fn transition_order(
    id: i64,
    event: OrderEvent,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let source = event.source_status();
    let Some(target) = source.apply(event) else {
        return Ok(false);
    };
    let result = match event.timestamp_column() {
        Some(column) => {
            let q = format!("UPDATE orders SET status = $1, {column} = $2 WHERE id = $3 AND status = $4");
            sqlx::query(&q)
                .bind(target.code())
                .bind(to_unix(now))
                .bind(id)
                .bind(source.code())
                .execute(conn)
                .await?
        },
        None => {
            sqlx::query("UPDATE orders SET status = $1 WHERE id = $2 AND status = $3")
                .bind(target.code())
                .bind(id)
                .bind(source.code())
                .execute(conn)
                .await?
        },
    };
    let updated = result.rows_affected() == 1;
    trace!("🗃️ Order #{id} {source} -> {target}: updated = {updated}");
    Ok(updated)
}

/// Pending orders created strictly before `cutoff`, oldest first.
pub async fn fetch_expired_orders(
    account_id: Option<i64>,
    cutoff: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders WHERE status = ");
    builder.push_bind(OrderStatusType::Pending.code());
    builder.push(" AND created_at < ");
    builder.push_bind(to_unix(cutoff));
    if let Some(account_id) = account_id {
        builder.push(" AND account_id = ");
        builder.push_bind(account_id);
    }
    builder.push(" ORDER BY created_at ASC, id ASC LIMIT ");
    builder.push_bind(limit.max(0));
    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    Ok(orders)
}

pub async fn accounts_with_pending_orders(conn: &mut SqliteConnection) -> Result<Vec<i64>, sqlx::Error> {
    let accounts = sqlx::query_scalar("SELECT DISTINCT account_id FROM orders WHERE status = $1 ORDER BY account_id")
        .bind(OrderStatusType::Pending.code())
        .fetch_all(conn)
        .await?;
    Ok(accounts)
}
