use actix_web::{http::StatusCode, test, test::TestRequest, web::ServiceConfig, App};
use log::debug;
use paycode_common::Secret;

pub const SECRET: &str = "abc";

pub fn secret() -> Secret<String> {
    Secret::new(SECRET.to_string())
}

pub async fn get_request(path: &str, configure: fn(&mut ServiceConfig)) -> (StatusCode, String) {
    send(TestRequest::get().uri(path), configure).await
}

pub async fn post_form(path: &str, form: &[(&str, &str)], configure: fn(&mut ServiceConfig)) -> (StatusCode, String) {
    send(TestRequest::post().uri(path).set_form(form), configure).await
}

async fn send(req: TestRequest, configure: fn(&mut ServiceConfig)) -> (StatusCode, String) {
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request");
    let res = test::call_service(&service, req.to_request()).await;
    let status = res.status();
    let body = test::read_body(res).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}
