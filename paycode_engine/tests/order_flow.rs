use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Duration, TimeZone, Utc};
use paycode_common::Amount;
use paycode_engine::{
    db_types::{setting_keys, NewOrder, Order, OrderEvent, OrderStatusType, PaymentKind},
    events::{EventHandlers, EventHooks, EventProducers},
    test_utils::prepare_env::fresh_database,
    traits::{OrderManagement, PaymentGatewayDatabase, PaymentGatewayError},
    OrderFlowApi,
    SqliteDatabase,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn amt(s: &str) -> Amount {
    s.parse().unwrap()
}

async fn new_api() -> (SqliteDatabase, OrderFlowApi<SqliteDatabase>) {
    let db = fresh_database().await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    (db, api)
}

async fn order(
    api: &OrderFlowApi<SqliteDatabase>,
    code: &str,
    account_id: i64,
    kind: PaymentKind,
    requested: &str,
    actual: &str,
    created_at: DateTime<Utc>,
) -> Order {
    let order = NewOrder::new(code, account_id, kind, amt(requested), amt(actual)).with_created_at(created_at);
    api.register_order(order).await.expect("Error registering order")
}

#[tokio::test]
async fn payment_matches_order_on_actual_amount() {
    let (db, api) = new_api().await;
    order(&api, "O1", 1, PaymentKind::Wechat, "1.00", "1.01", t0()).await;
    assert_eq!(db.fetch_amount_lock_holder(1, amt("1.01"), PaymentKind::Wechat).await.unwrap(), Some("O1".into()));

    let paid_at = t0() + Duration::minutes(2);
    let matched = api.match_payment(1, amt("1.01"), PaymentKind::Wechat, paid_at).await.unwrap().expect("no match");
    assert_eq!(matched.order_code, "O1");
    assert_eq!(matched.status, OrderStatusType::Paid);
    assert_eq!(matched.paid_at, Some(paid_at));
    assert_eq!(matched.closed_at, None);
    // The slot is free again once the order has left pending
    assert_eq!(db.fetch_amount_lock_holder(1, amt("1.01"), PaymentKind::Wechat).await.unwrap(), None);

    // A paid order is never matched twice
    let again = api.match_payment(1, amt("1.01"), PaymentKind::Wechat, paid_at).await.unwrap();
    assert!(again.is_none());
}

#[tokio::test]
async fn actual_amount_takes_precedence_over_requested() {
    let (_db, api) = new_api().await;
    order(&api, "older", 1, PaymentKind::Alipay, "2.00", "2.01", t0()).await;
    order(&api, "newer", 1, PaymentKind::Alipay, "2.01", "2.02", t0() + Duration::minutes(1)).await;
    let now = t0() + Duration::minutes(2);

    let first = api.match_payment(1, amt("2.01"), PaymentKind::Alipay, now).await.unwrap().unwrap();
    assert_eq!(first.order_code, "older");
    // Nothing pending has actual = 2.01 any more, so the requested amount is used
    let second = api.match_payment(1, amt("2.01"), PaymentKind::Alipay, now).await.unwrap().unwrap();
    assert_eq!(second.order_code, "newer");
    assert!(api.match_payment(1, amt("2.01"), PaymentKind::Alipay, now).await.unwrap().is_none());
}

#[tokio::test]
async fn most_recent_order_wins() {
    let (_db, api) = new_api().await;
    order(&api, "first", 1, PaymentKind::Wechat, "3.00", "3.01", t0()).await;
    order(&api, "second", 1, PaymentKind::Wechat, "3.00", "3.02", t0() + Duration::seconds(30)).await;
    order(&api, "other-account", 2, PaymentKind::Wechat, "3.00", "3.03", t0() + Duration::minutes(1)).await;

    let now = t0() + Duration::minutes(2);
    let matched = api.match_payment(1, amt("3.00"), PaymentKind::Wechat, now).await.unwrap().unwrap();
    assert_eq!(matched.order_code, "second");
    let matched = api.match_payment(1, amt("3.00"), PaymentKind::Wechat, now).await.unwrap().unwrap();
    assert_eq!(matched.order_code, "first");
    assert!(api.match_payment(1, amt("3.00"), PaymentKind::Wechat, now).await.unwrap().is_none());
}

#[tokio::test]
async fn kind_mismatch_never_matches() {
    let (db, api) = new_api().await;
    order(&api, "ali", 1, PaymentKind::Alipay, "4.00", "4.00", t0()).await;
    let now = t0() + Duration::minutes(1);
    assert!(api.match_payment(1, amt("4.00"), PaymentKind::Wechat, now).await.unwrap().is_none());
    let order = db.fetch_order_by_code("ali").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Pending);
}

#[tokio::test]
async fn concurrent_payments_pay_the_order_once() {
    let (_db, api) = new_api().await;
    order(&api, "contested", 1, PaymentKind::Wechat, "5.00", "5.00", t0()).await;
    let now = t0() + Duration::minutes(1);
    let (a, b) = tokio::join!(
        api.match_payment(1, amt("5.00"), PaymentKind::Wechat, now),
        api.match_payment(1, amt("5.00"), PaymentKind::Wechat, now)
    );
    let matched = [a.unwrap(), b.unwrap()].into_iter().flatten().collect::<Vec<_>>();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].order_code, "contested");
}

#[tokio::test]
async fn unpaid_orders_are_reclaimed_after_timeout() {
    let (db, api) = new_api().await;
    order(&api, "O1", 1, PaymentKind::Wechat, "1.00", "1.01", t0()).await;

    let summary = api.reclaim_all(100, t0() + Duration::seconds(330)).await.unwrap();
    assert_eq!(summary.accounts, 1);
    assert_eq!(summary.closed_count(), 1);
    let closed = db.fetch_order_by_code("O1").await.unwrap().unwrap();
    assert_eq!(closed.status, OrderStatusType::Closed);
    assert_eq!(closed.closed_at, Some(t0() + Duration::seconds(330)));
    assert_eq!(closed.paid_at, None);
    assert_eq!(db.fetch_amount_lock_holder(1, amt("1.01"), PaymentKind::Wechat).await.unwrap(), None);

    // A late payment finds nothing
    let late = api.match_payment(1, amt("1.01"), PaymentKind::Wechat, t0() + Duration::minutes(6)).await.unwrap();
    assert!(late.is_none());
}

#[tokio::test]
async fn reclaim_never_closes_young_orders_and_converges() {
    let (db, api) = new_api().await;
    order(&api, "old", 1, PaymentKind::Wechat, "1.00", "1.00", t0()).await;
    order(&api, "young", 1, PaymentKind::Wechat, "1.00", "1.01", t0() + Duration::minutes(3)).await;
    let now = t0() + Duration::seconds(301);

    let result = api.reclaim_batch(None, 100, 5, now).await.unwrap();
    assert_eq!(result.closed_count(), 1);
    assert_eq!(result.closed[0].order_code, "old");
    let result = api.reclaim_batch(None, 100, 5, now).await.unwrap();
    assert_eq!(result, Default::default());
    let young = db.fetch_order_by_code("young").await.unwrap().unwrap();
    assert_eq!(young.status, OrderStatusType::Pending);
}

#[tokio::test]
async fn reclaim_respects_batch_limit_oldest_first() {
    let (_db, api) = new_api().await;
    for i in 0..3 {
        let created = t0() + Duration::seconds(i);
        order(&api, &format!("O{i}"), 1, PaymentKind::Alipay, "9.00", &format!("9.0{i}"), created).await;
    }
    let now = t0() + Duration::hours(1);
    let first = api.reclaim_batch(Some(1), 2, 5, now).await.unwrap();
    let codes = first.closed.iter().map(|o| o.order_code.as_str()).collect::<Vec<_>>();
    assert_eq!(codes, vec!["O0", "O1"]);
    let second = api.reclaim_batch(Some(1), 2, 5, now).await.unwrap();
    assert_eq!(second.closed_count(), 1);
    assert_eq!(second.closed[0].order_code, "O2");
    assert_eq!(api.reclaim_batch(Some(1), 2, 5, now).await.unwrap().closed_count(), 0);
}

#[tokio::test]
async fn account_timeout_override_is_honoured() {
    let (db, api) = new_api().await;
    db.save_account_setting(2, setting_keys::ORDER_TIMEOUT, "10").await.unwrap();
    db.save_account_setting(3, setting_keys::ORDER_TIMEOUT, "-4").await.unwrap();
    order(&api, "acc1", 1, PaymentKind::Wechat, "1.00", "1.00", t0()).await;
    order(&api, "acc2", 2, PaymentKind::Wechat, "1.00", "1.00", t0()).await;
    order(&api, "acc3", 3, PaymentKind::Wechat, "1.00", "1.00", t0()).await;

    let summary = api.reclaim_all(100, t0() + Duration::minutes(6)).await.unwrap();
    let mut codes = summary.closed.iter().map(|o| o.order_code.clone()).collect::<Vec<_>>();
    codes.sort();
    // A non-positive override falls back to the default
    assert_eq!(codes, vec!["acc1", "acc3"]);

    let summary = api.reclaim_all(100, t0() + Duration::minutes(11)).await.unwrap();
    assert_eq!(summary.accounts, 1);
    assert_eq!(summary.closed[0].order_code, "acc2");
}

#[tokio::test]
async fn expired_listing_is_read_only() {
    let (db, api) = new_api().await;
    order(&api, "ancient", 1, PaymentKind::Wechat, "1.00", "1.00", t0()).await;
    order(&api, "recent", 1, PaymentKind::Wechat, "1.00", "1.01", t0() + Duration::minutes(20)).await;
    let now = t0() + Duration::minutes(31);

    let listed = api.expired_orders(Some(1), 10, None, now).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].order_code, "ancient");
    let listed = api.expired_orders(None, 10, Some(5), now).await.unwrap();
    assert_eq!(listed.len(), 2);
    let ancient = db.fetch_order_by_code("ancient").await.unwrap().unwrap();
    assert_eq!(ancient.status, OrderStatusType::Pending);
}

#[tokio::test]
async fn taken_amount_slot_is_rejected() {
    let (_db, api) = new_api().await;
    order(&api, "holder", 1, PaymentKind::Wechat, "1.00", "1.00", t0()).await;
    let clash = NewOrder::new("clash", 1, PaymentKind::Wechat, amt("1.00"), amt("1.00"));
    let err = api.register_order(clash).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::AmountSlotTaken { account_id: 1, .. }));
    // Different kind, different slot
    let other = NewOrder::new("other", 1, PaymentKind::Alipay, amt("1.00"), amt("1.00"));
    assert!(api.register_order(other).await.is_ok());
}

#[tokio::test]
async fn orphaned_locks_are_purged() {
    let (db, api) = new_api().await;
    let held = order(&api, "held", 1, PaymentKind::Wechat, "1.00", "1.00", t0()).await;
    // Paid out of band, so the lock was never released
    assert!(db.transition_order(held.id, OrderEvent::PaymentMatched, t0()).await.unwrap());
    // Locked ahead of the order insert. Must survive the purge.
    assert!(db.acquire_amount_lock(1, amt("2.00"), PaymentKind::Wechat, "in-flight").await.unwrap());

    let summary = api.reclaim_all(100, t0() + Duration::minutes(1)).await.unwrap();
    assert_eq!(summary.purged_locks, 1);
    assert_eq!(db.fetch_amount_lock_holder(1, amt("1.00"), PaymentKind::Wechat).await.unwrap(), None);
    assert_eq!(
        db.fetch_amount_lock_holder(1, amt("2.00"), PaymentKind::Wechat).await.unwrap(),
        Some("in-flight".to_string())
    );
}

#[tokio::test]
async fn closed_orders_cannot_be_paid_and_paid_orders_cannot_close() {
    let (db, _api) = new_api().await;
    let o = NewOrder::new("x", 1, PaymentKind::Wechat, amt("1.00"), amt("1.00")).with_created_at(t0());
    let o = db.insert_order(o).await.unwrap();
    assert!(db.transition_order(o.id, OrderEvent::Expired, t0()).await.unwrap());
    assert!(!db.transition_order(o.id, OrderEvent::PaymentMatched, t0()).await.unwrap());
    assert!(!db.transition_order(o.id, OrderEvent::NotificationFailed, t0()).await.unwrap());
    let o = db.fetch_order_by_code("x").await.unwrap().unwrap();
    assert_eq!(o.status, OrderStatusType::Closed);
    assert_eq!(o.paid_at, None);

    let dup = NewOrder::new("x", 1, PaymentKind::Wechat, amt("1.00"), amt("1.00"));
    assert!(matches!(db.insert_order(dup).await, Err(PaymentGatewayError::OrderAlreadyExists(_))));
}

#[tokio::test]
async fn expiry_publishes_events() {
    let db = fresh_database().await;
    let count = Arc::new(AtomicUsize::new(0));
    let c2 = count.clone();
    let mut hooks = EventHooks::default();
    hooks.on_order_expired(move |ev| {
        let count = count.clone();
        Box::pin(async move {
            assert_eq!(ev.order.status, OrderStatusType::Closed);
            count.fetch_add(1, Ordering::SeqCst);
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let mut handlers = EventHandlers::new(10, hooks);
    let api = OrderFlowApi::new(db, handlers.producers());
    order(&api, "a", 1, PaymentKind::Wechat, "1.00", "1.00", t0()).await;
    order(&api, "b", 2, PaymentKind::Wechat, "1.00", "1.00", t0()).await;
    api.reclaim_all(100, t0() + Duration::hours(1)).await.unwrap();
    drop(api);
    let handler = handlers.on_order_expired.take().unwrap();
    handler.start_handler().await;
    assert_eq!(c2.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unusable_timeout_overrides_fall_back_without_stopping_the_pass() {
    let (db, api) = new_api().await;
    db.save_account_setting(2, setting_keys::ORDER_TIMEOUT, "200000000000000").await.unwrap();
    db.save_account_setting(3, setting_keys::ORDER_TIMEOUT, "0").await.unwrap();
    db.save_account_setting(4, setting_keys::ORDER_TIMEOUT, "ten").await.unwrap();
    for account_id in 1..=4 {
        order(&api, &format!("acc{account_id}"), account_id, PaymentKind::Wechat, "1.00", "1.00", t0()).await;
    }
    assert_eq!(api.order_timeout_for(2).await, 5);

    // Runs in its own task, the way the scheduler drives it
    let handle = tokio::spawn(async move {
        let summary = api.reclaim_all(100, t0() + Duration::minutes(6)).await;
        (api, summary)
    });
    let (api, summary) = handle.await.expect("reclaim task must not panic");
    let summary = summary.unwrap();
    let mut codes = summary.closed.iter().map(|o| o.order_code.clone()).collect::<Vec<_>>();
    codes.sort();
    assert_eq!(codes, vec!["acc1", "acc2", "acc3", "acc4"]);
    assert_eq!(summary.failed_accounts, 0);

    // Out-of-range windows passed in directly are errors, not panics
    let now = t0() + Duration::minutes(6);
    let err = api.reclaim_batch(Some(1), 10, 200_000_000_000_000, now).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::InvalidTimeout(200_000_000_000_000)));
    let err = api.expired_orders(None, 10, Some(i64::MAX), now).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::InvalidTimeout(i64::MAX)));
    let err = api.expired_orders(None, 10, Some(-1), now).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::InvalidTimeout(-1)));
}

#[test]
fn oversized_default_timeout_is_ignored() {
    let api = OrderFlowApi::new((), EventProducers::default()).with_default_order_timeout(200_000_000_000_000);
    assert_eq!(api.default_order_timeout(), 5);
    let api = api.with_default_order_timeout(0).with_default_order_timeout(15);
    assert_eq!(api.default_order_timeout(), 15);
}

#[tokio::test]
async fn registered_orders_are_visible_to_other_connections_at_once() {
    let (db, api) = new_api().await;
    // A second pool, so reads never share a connection with the writer
    let reader = SqliteDatabase::new_with_url(db.url(), 2).await.unwrap();
    let matcher = OrderFlowApi::new(reader.clone(), EventProducers::default());
    for i in 0..20 {
        let account_id = i + 1;
        let code = format!("vis-{i}");
        let created = order(&api, &code, account_id, PaymentKind::Wechat, "1.00", "1.01", t0()).await;
        let seen = reader.fetch_order_by_code(&code).await.unwrap().expect("registered order must be visible");
        assert_eq!(seen.id, created.id);
        let now = t0() + Duration::minutes(1);
        let paid = matcher.match_payment(account_id, amt("1.01"), PaymentKind::Wechat, now).await.unwrap();
        assert_eq!(paid.map(|o| o.order_code), Some(code));
    }
}

#[tokio::test]
async fn failed_insert_leaves_the_slot_free() {
    let (db, api) = new_api().await;
    order(&api, "dup", 1, PaymentKind::Wechat, "1.00", "1.00", t0()).await;
    // Same code, different amount: the lock is free but the insert fails
    let dup = NewOrder::new("dup", 1, PaymentKind::Wechat, amt("2.00"), amt("2.00"));
    assert!(matches!(api.register_order(dup).await, Err(PaymentGatewayError::OrderAlreadyExists(_))));
    assert_eq!(db.fetch_amount_lock_holder(1, amt("2.00"), PaymentKind::Wechat).await.unwrap(), None);
}
