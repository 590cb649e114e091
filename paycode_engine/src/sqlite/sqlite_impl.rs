//! `SqliteDatabase` is a concrete implementation of a reconciliation engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`traits`] module.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use paycode_common::{Amount, Secret};
use sqlx::{migrate, SqlitePool};

use super::db::{amount_locks, db_url, merchants, new_pool, orders, settings, unmatched};
use crate::{
    db_types::{
        is_valid_order_timeout,
        AmountField,
        MonitorRecord,
        NewOrder,
        NewUnmatchedPayment,
        OnlineState,
        Order,
        OrderEvent,
        PaymentKind,
        UnmatchedPayment,
    },
    traits::{MerchantManagement, MonitorManagement, OrderManagement, PaymentGatewayDatabase, PaymentGatewayError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        self.pool.close().await;
        Ok(())
    }
}

impl MerchantManagement for SqliteDatabase {
    async fn fetch_account_id_for_app_id(&self, app_id: &str) -> Result<Option<i64>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let account_id = merchants::fetch_account_id_for_app_id(app_id, &mut conn).await?;
        Ok(account_id)
    }

    async fn fetch_secret_key(&self, account_id: i64) -> Result<Option<Secret<String>>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let key = settings::fetch_setting(account_id, settings::SECRET_KEY, &mut conn).await?;
        Ok(key.filter(|k| !k.is_empty()).map(Secret::new))
    }

    async fn fetch_order_timeout(&self, account_id: i64) -> Result<Option<i64>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let value = settings::fetch_setting(account_id, settings::ORDER_TIMEOUT, &mut conn).await?;
        let minutes = value.and_then(|v| match v.trim().parse::<i64>() {
            Ok(m) if is_valid_order_timeout(m) => Some(m),
            _ => {
                warn!("🗃️ Ignoring invalid order timeout setting '{v}' for account #{account_id}");
                None
            },
        });
        Ok(minutes)
    }
}

impl MonitorManagement for SqliteDatabase {
    async fn record_heartbeat(&self, account_id: i64, now: DateTime<Utc>) -> Result<(), PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let advanced = settings::advance_heartbeat(account_id, now, &mut tx).await?;
        if !advanced {
            debug!("🗃️ A later heartbeat is already stored for account #{account_id}. Timestamp left unchanged.");
        }
        settings::upsert_setting(account_id, settings::ONLINE_FLAG, OnlineState::Online.as_flag(), &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn record_payment(&self, account_id: i64, now: DateTime<Utc>) -> Result<(), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        settings::upsert_setting(account_id, settings::LAST_PAYMENT, &now.timestamp().to_string(), &mut conn).await?;
        Ok(())
    }

    async fn fetch_monitor_record(&self, account_id: i64) -> Result<MonitorRecord, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let keys = [settings::LAST_HEARTBEAT, settings::LAST_PAYMENT, settings::ONLINE_FLAG];
        let mut values = settings::fetch_settings(account_id, &keys, &mut conn).await?;
        Ok(MonitorRecord {
            account_id,
            last_heartbeat: values.remove(settings::LAST_HEARTBEAT),
            last_payment: values.remove(settings::LAST_PAYMENT),
            state_flag: values.remove(settings::ONLINE_FLAG),
        })
    }

    async fn accounts_with_heartbeat(&self) -> Result<Vec<i64>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let accounts = settings::accounts_with_setting(settings::LAST_HEARTBEAT, &mut conn).await?;
        Ok(accounts)
    }

    async fn mark_offline(
        &self,
        account_id: i64,
        observed_heartbeat: Option<String>,
    ) -> Result<bool, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let marked = settings::mark_offline_if_unchanged(account_id, observed_heartbeat.as_deref(), &mut conn).await?;
        Ok(marked)
    }
}

impl OrderManagement for SqliteDatabase {
    async fn insert_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn insert_order_with_lock(&self, order: NewOrder) -> Result<Order, PaymentGatewayError> {
        let (account_id, amount, kind) = (order.account_id, order.actual_amount, order.kind);
        let mut tx = self.pool.begin().await?;
        if !amount_locks::acquire(account_id, amount, kind, &order.order_code, &mut tx).await? {
            debug!("🗃️ Amount {amount} ({kind}) is already locked for account #{account_id}");
            return Err(PaymentGatewayError::AmountSlotTaken { account_id, amount: amount.to_string() });
        }
        // A failed insert drops the transaction, which rolls the lock back with it
        let order = orders::insert_order(order, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn fetch_order_by_code(&self, order_code: &str) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_code(order_code, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_latest_pending_order(
        &self,
        account_id: i64,
        kind: PaymentKind,
        amount: Amount,
        field: AmountField,
    ) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_latest_pending_order(account_id, kind, amount, field, &mut conn).await?;
        Ok(order)
    }

    async fn transition_order(
        &self,
        order_id: i64,
        event: OrderEvent,
        now: DateTime<Utc>,
    ) -> Result<bool, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let updated = orders::transition_order(order_id, event, now, &mut conn).await?;
        Ok(updated)
    }

    async fn fetch_expired_orders(
        &self,
        account_id: Option<i64>,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_expired_orders(account_id, cutoff, limit, &mut conn).await?;
        Ok(orders)
    }

    async fn accounts_with_pending_orders(&self) -> Result<Vec<i64>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let accounts = orders::accounts_with_pending_orders(&mut conn).await?;
        Ok(accounts)
    }

    async fn release_amount_lock(&self, order_code: &str) -> Result<u64, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let released = amount_locks::release(order_code, &mut conn).await?;
        Ok(released)
    }

    async fn purge_orphan_amount_locks(&self) -> Result<u64, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let purged = amount_locks::purge_orphans(&mut conn).await?;
        Ok(purged)
    }

    async fn record_unmatched_payment(&self, payment: NewUnmatchedPayment) -> Result<i64, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let id = unmatched::insert(payment, &mut tx).await?;
        tx.commit().await?;
        Ok(id)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `PAYCODE_DATABASE_URL`
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date.
    pub async fn run_migrations(&self) -> Result<(), PaymentGatewayError> {
        migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| PaymentGatewayError::DatabaseError(format!("Migration failed. {e}")))?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Administrative write path for the merchant mapping table, which is otherwise managed outside this service.
    pub async fn save_merchant_mapping(
        &self,
        app_id: &str,
        account_id: i64,
        active: bool,
    ) -> Result<(), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        merchants::upsert_mapping(app_id, account_id, active, &mut conn).await?;
        Ok(())
    }

    /// Administrative write path for account settings (the secret key, the order timeout override and so on).
    pub async fn save_account_setting(&self, account_id: i64, key: &str, value: &str) -> Result<(), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        settings::upsert_setting(account_id, key, value, &mut conn).await?;
        Ok(())
    }

    pub async fn fetch_unmatched_payments(&self, account_id: i64) -> Result<Vec<UnmatchedPayment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let payments = unmatched::fetch_for_account(account_id, &mut conn).await?;
        Ok(payments)
    }

    /// Claims the (account, amount, kind) slot on its own, without storing an order. Returns `false` if the slot is
    /// already held. Allocators that store orders through some other path use this to reserve the amount first.
    pub async fn acquire_amount_lock(
        &self,
        account_id: i64,
        amount: Amount,
        kind: PaymentKind,
        order_code: &str,
    ) -> Result<bool, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let acquired = amount_locks::acquire(account_id, amount, kind, order_code, &mut conn).await?;
        Ok(acquired)
    }

    /// The order code currently holding the (account, amount, kind) slot, if any.
    pub async fn fetch_amount_lock_holder(
        &self,
        account_id: i64,
        amount: Amount,
        kind: PaymentKind,
    ) -> Result<Option<String>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let holder = amount_locks::fetch_lock_holder(account_id, amount, kind, &mut conn).await?;
        Ok(holder)
    }

    pub async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_id(id, &mut conn).await?;
        Ok(order)
    }
}
