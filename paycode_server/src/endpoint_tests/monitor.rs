use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{Duration, Utc};
use paycode_common::{Amount, Secret};
use paycode_engine::{
    db_types::{AmountField, Order, OrderEvent, OrderStatusType, PaymentKind},
    events::EventProducers,
    helpers::{heartbeat_signature, push_signature},
    traits::PaymentGatewayError,
    MonitorApi,
};

use super::{
    helpers::{get_request, post_form, secret},
    mocks::{mock_db, MockPaycodeDb},
};
use crate::{
    data_objects::JsonResponse,
    routes::{health, HeartbeatRoute, PaymentPushRoute},
};

const T: &str = "1700000000";

fn serve(cfg: &mut ServiceConfig, db: MockPaycodeDb) {
    let api = MonitorApi::new(db, EventProducers::default());
    cfg.app_data(web::Data::new(api))
        .service(health)
        .service(HeartbeatRoute::<MockPaycodeDb>::new())
        .service(PaymentPushRoute::<MockPaycodeDb>::new());
}

fn merchant(db: &mut MockPaycodeDb) {
    db.expect_fetch_account_id_for_app_id().returning(|app_id| Ok((app_id == "shop-7").then_some(7)));
    db.expect_fetch_secret_key().returning(|_| Ok(Some(secret())));
    db.expect_record_heartbeat().returning(|_, _| Ok(()));
    db.expect_record_payment().returning(|_, _| Ok(()));
    db.expect_record_unmatched_payment().returning(|_| Ok(1));
}

fn no_orders(db: &mut MockPaycodeDb) {
    merchant(db);
    db.expect_fetch_latest_pending_order().returning(|_, _, _, _| Ok(None));
}

fn pending_order() -> Order {
    Order {
        id: 5,
        order_code: "O1".into(),
        account_id: 1,
        kind: PaymentKind::Wechat,
        requested_amount: Amount::from_cents(100),
        actual_amount: Amount::from_cents(101),
        status: OrderStatusType::Pending,
        created_at: Utc::now() - Duration::minutes(2),
        paid_at: None,
        closed_at: None,
    }
}

fn one_pending_order(db: &mut MockPaycodeDb) {
    merchant(db);
    db.expect_fetch_latest_pending_order().returning(|_, kind, amount, field| {
        let hit = kind == PaymentKind::Wechat && amount == Amount::from_cents(101) && field == AmountField::Actual;
        Ok(hit.then(pending_order))
    });
    db.expect_transition_order().returning(|id, event, _| Ok(id == 5 && event == OrderEvent::PaymentMatched));
    db.expect_release_amount_lock().returning(|_| Ok(1));
    db.expect_fetch_order_by_code().returning(|_| {
        Ok(Some(Order { status: OrderStatusType::Paid, paid_at: Some(Utc::now()), ..pending_order() }))
    });
}

fn broken_store(db: &mut MockPaycodeDb) {
    db.expect_fetch_secret_key().returning(|_| Err(PaymentGatewayError::DatabaseError("disk on fire".into())));
}

fn configure_merchant(cfg: &mut ServiceConfig) {
    serve(cfg, mock_db(no_orders));
}

fn configure_pending_order(cfg: &mut ServiceConfig) {
    serve(cfg, mock_db(one_pending_order));
}

fn configure_broken_store(cfg: &mut ServiceConfig) {
    serve(cfg, mock_db(broken_store));
}

fn response(body: &str) -> JsonResponse {
    serde_json::from_str(body).expect("Response is not a JSON envelope")
}

fn heartbeat_query(path: &str, appid: Option<&str>, sign: &str) -> String {
    let appid = appid.map(|a| format!("&appid={a}")).unwrap_or_default();
    format!("{path}?t={T}&sign={sign}{appid}")
}

#[actix_web::test]
async fn health_check() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/health", configure_merchant).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
}

#[actix_web::test]
async fn heartbeat_by_query() {
    let _ = env_logger::try_init().ok();
    let sign = heartbeat_signature(T, &secret());
    let (status, body) = get_request(&heartbeat_query("/monitor/heart", None, &sign), configure_merchant).await;
    assert_eq!(status, StatusCode::OK);
    let res = response(&body);
    assert!(res.success);
    assert_eq!(res.message, "Heartbeat recorded for account 1");
}

#[actix_web::test]
async fn heartbeat_by_form() {
    let _ = env_logger::try_init().ok();
    let sign = heartbeat_signature(T, &secret());
    let form = [("t", T), ("sign", sign.as_str()), ("appid", "shop-7")];
    let (status, body) = post_form("/monitor/heart", &form, configure_merchant).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response(&body).message, "Heartbeat recorded for account 7");
}

#[actix_web::test]
async fn legacy_heartbeat_path() {
    let _ = env_logger::try_init().ok();
    let sign = heartbeat_signature(T, &secret());
    let (status, body) = get_request(&heartbeat_query("/appHeart", None, &sign), configure_merchant).await;
    assert_eq!(status, StatusCode::OK);
    assert!(response(&body).success);
}

#[actix_web::test]
async fn heartbeat_with_bad_signature() {
    let _ = env_logger::try_init().ok();
    let sign = heartbeat_signature(T, &Secret::new("abd".to_string()));
    let (status, body) = get_request(&heartbeat_query("/monitor/heart", None, &sign), configure_merchant).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let res = response(&body);
    assert!(!res.success);
    assert_eq!(res.message, "Invalid signature");
}

#[actix_web::test]
async fn heartbeat_without_timestamp() {
    let _ = env_logger::try_init().ok();
    let sign = heartbeat_signature(T, &secret());
    let (status, body) = get_request(&format!("/monitor/heart?sign={sign}"), configure_merchant).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response(&body).message, "Missing required field: t");
}

#[actix_web::test]
async fn heartbeat_for_unknown_merchant() {
    let _ = env_logger::try_init().ok();
    let sign = heartbeat_signature(T, &secret());
    let (status, body) =
        get_request(&heartbeat_query("/monitor/heart", Some("shop-9"), &sign), configure_merchant).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response(&body).message, "Unknown merchant: shop-9");
}

#[actix_web::test]
async fn push_that_pays_an_order() {
    let _ = env_logger::try_init().ok();
    let sign = push_signature("1", "1.01", T, &secret());
    let form = [("t", T), ("sign", sign.as_str()), ("type", "1"), ("price", "1.01")];
    let (status, body) = post_form("/monitor/push", &form, configure_pending_order).await;
    assert_eq!(status, StatusCode::OK);
    let res = response(&body);
    assert!(res.success);
    assert_eq!(res.message, "Payment of 1.01 matched to order O1");
}

#[actix_web::test]
async fn push_without_a_pending_order() {
    let _ = env_logger::try_init().ok();
    let sign = push_signature("2", "8.88", T, &secret());
    let path = format!("/appPush?t={T}&sign={sign}&type=2&price=8.88");
    let (status, body) = get_request(&path, configure_merchant).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response(&body).message, "Payment of 8.88 recorded. No pending order matched it.");
}

#[actix_web::test]
async fn push_without_price() {
    let _ = env_logger::try_init().ok();
    let sign = push_signature("1", "", T, &secret());
    let path = format!("/monitor/push?t={T}&sign={sign}&type=1");
    let (status, body) = get_request(&path, configure_merchant).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response(&body).message, "Missing required field: price");
}

#[actix_web::test]
async fn push_with_unknown_payment_type() {
    let _ = env_logger::try_init().ok();
    let sign = push_signature("3", "1.00", T, &secret());
    let path = format!("/monitor/push?t={T}&sign={sign}&type=3&price=1.00");
    let (status, body) = get_request(&path, configure_merchant).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!response(&body).success);
}

#[actix_web::test]
async fn store_failures_do_not_leak() {
    let _ = env_logger::try_init().ok();
    let sign = heartbeat_signature(T, &secret());
    let (status, body) = get_request(&heartbeat_query("/monitor/heart", None, &sign), configure_broken_store).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let res = response(&body);
    assert_eq!(res.message, "Internal server error");
    assert!(!body.contains("disk"));
}
