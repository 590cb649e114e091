use chrono::{DateTime, Utc};
use mockall::mock;
use paycode_common::{Amount, Secret};
use paycode_engine::{
    db_types::{AmountField, MonitorRecord, NewOrder, NewUnmatchedPayment, Order, OrderEvent, PaymentKind},
    traits::{MerchantManagement, MonitorManagement, OrderManagement, PaymentGatewayDatabase, PaymentGatewayError},
};

mock! {
    pub PaycodeDb {}
    impl Clone for PaycodeDb {
        fn clone(&self) -> Self;
    }
    impl PaymentGatewayDatabase for PaycodeDb {
        fn url(&self) -> &str;
        async fn close(&mut self) -> Result<(), PaymentGatewayError>;
    }
    impl MerchantManagement for PaycodeDb {
        async fn fetch_account_id_for_app_id(&self, app_id: &str) -> Result<Option<i64>, PaymentGatewayError>;
        async fn fetch_secret_key(&self, account_id: i64) -> Result<Option<Secret<String>>, PaymentGatewayError>;
        async fn fetch_order_timeout(&self, account_id: i64) -> Result<Option<i64>, PaymentGatewayError>;
    }
    impl MonitorManagement for PaycodeDb {
        async fn record_heartbeat(&self, account_id: i64, now: DateTime<Utc>) -> Result<(), PaymentGatewayError>;
        async fn record_payment(&self, account_id: i64, now: DateTime<Utc>) -> Result<(), PaymentGatewayError>;
        async fn fetch_monitor_record(&self, account_id: i64) -> Result<MonitorRecord, PaymentGatewayError>;
        async fn accounts_with_heartbeat(&self) -> Result<Vec<i64>, PaymentGatewayError>;
        async fn mark_offline(&self, account_id: i64, observed_heartbeat: Option<String>) -> Result<bool, PaymentGatewayError>;
    }
    impl OrderManagement for PaycodeDb {
        async fn insert_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError>;
        async fn insert_order_with_lock(&self, order: NewOrder) -> Result<Order, PaymentGatewayError>;
        async fn fetch_order_by_code(&self, order_code: &str) -> Result<Option<Order>, PaymentGatewayError>;
        async fn fetch_latest_pending_order(&self, account_id: i64, kind: PaymentKind, amount: Amount, field: AmountField) -> Result<Option<Order>, PaymentGatewayError>;
        async fn transition_order(&self, order_id: i64, event: OrderEvent, now: DateTime<Utc>) -> Result<bool, PaymentGatewayError>;
        async fn fetch_expired_orders(&self, account_id: Option<i64>, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<Order>, PaymentGatewayError>;
        async fn accounts_with_pending_orders(&self) -> Result<Vec<i64>, PaymentGatewayError>;
        async fn release_amount_lock(&self, order_code: &str) -> Result<u64, PaymentGatewayError>;
        async fn purge_orphan_amount_locks(&self) -> Result<u64, PaymentGatewayError>;
        async fn record_unmatched_payment(&self, payment: NewUnmatchedPayment) -> Result<i64, PaymentGatewayError>;
    }
}

/// Builds a mock backend. `MonitorApi` clones the backend for its order flow, so every clone is given the same
/// expectations.
pub fn mock_db(configure: fn(&mut MockPaycodeDb)) -> MockPaycodeDb {
    let mut db = MockPaycodeDb::new();
    configure(&mut db);
    db.expect_clone().returning(move || {
        let mut clone = MockPaycodeDb::new();
        configure(&mut clone);
        clone
    });
    db
}
