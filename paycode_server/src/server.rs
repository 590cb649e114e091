use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use paycode_engine::{events::EventProducers, MonitorApi, SqliteDatabase};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    routes::{health, HeartbeatRoute, PaymentPushRoute},
    scheduler::Scheduler,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let producers = EventProducers::default();
    let mut scheduler = Scheduler::new(db.clone(), producers.clone(), config.scheduler.clone());
    scheduler.start();
    let result = match create_server_instance(config, db, producers) {
        Ok(srv) => srv.await.map_err(|e| ServerError::Unspecified(e.to_string())),
        Err(e) => Err(e),
    };
    scheduler.stop().await;
    result
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let srv = HttpServer::new(move || {
        let monitor_api = MonitorApi::new(db.clone(), producers.clone())
            .with_bootstrap_account(config.bootstrap_account_id)
            .with_unmatched_recording(config.record_unmatched)
            .with_default_order_timeout(config.scheduler.order_timeout_minutes);
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("paycode::access_log"))
            .app_data(web::Data::new(monitor_api))
            .service(health)
            .service(HeartbeatRoute::<SqliteDatabase>::new())
            .service(PaymentPushRoute::<SqliteDatabase>::new())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
