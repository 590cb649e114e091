//! Request handler definitions
//!
//! Define each route and its handler here. Handlers do no more than unpack the request, call into the engine APIs and
//! wrap the result in a [`JsonResponse`]. Anything longer belongs in the engine.
//!
//! Monitor agents send their fields either in the query string or as a form-encoded body, using GET or POST, so every
//! monitor route accepts both.
use actix_web::{get, web, HttpResponse, Responder};
use chrono::Utc;
use log::*;
use paycode_engine::{
    monitor_objects::{HeartbeatMessage, PushMessage},
    traits::PaymentGatewayDatabase,
    MonitorApi,
};

use crate::{
    data_objects::{HeartbeatParams, JsonResponse, PushParams},
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $first:ident $(| $rest:ident)* [$($path:literal),+] impl $bound:path) => {
        paste::paste! { pub struct [<$name:camel Route>]<B>(core::marker::PhantomData<fn() -> B>);}
        paste::paste! { impl<B> [<$name:camel Route>]<B> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> B>)
            }
        }}
        paste::paste! { impl<B> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<B>
        where
            B: $bound + 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new(vec![$($path),+])
                    .name(stringify!($name))
                    .guard(actix_web::guard::Any(actix_web::guard::$first())$(.or(actix_web::guard::$rest()))*)
                    .to($name::<B>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Monitor  ----------------------------------------------------
route!(heartbeat => Get | Post ["/monitor/heart", "/appHeart"] impl PaymentGatewayDatabase);
pub async fn heartbeat<B: PaymentGatewayDatabase>(
    query: web::Query<HeartbeatParams>,
    form: Option<web::Form<HeartbeatParams>>,
    api: web::Data<MonitorApi<B>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received heartbeat");
    let params = query.into_inner().merge(form.map(|f| f.into_inner()));
    let msg = HeartbeatMessage::try_from(params)?;
    let account_id = api.process_heartbeat(&msg, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Heartbeat recorded for account {account_id}"))))
}

route!(payment_push => Get | Post ["/monitor/push", "/appPush"] impl PaymentGatewayDatabase);
pub async fn payment_push<B: PaymentGatewayDatabase>(
    query: web::Query<PushParams>,
    form: Option<web::Form<PushParams>>,
    api: web::Data<MonitorApi<B>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received payment push");
    let params = query.into_inner().merge(form.map(|f| f.into_inner()));
    let msg = PushMessage::try_from(params)?;
    let outcome = api.process_push(&msg, Utc::now()).await?;
    let message = match outcome.matched {
        Some(order) => format!("Payment of {} matched to order {}", outcome.amount, order.order_code),
        None => format!("Payment of {} recorded. No pending order matched it.", outcome.amount),
    };
    Ok(HttpResponse::Ok().json(JsonResponse::success(message)))
}
