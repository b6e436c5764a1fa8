use actix_web::{get, HttpResponse, Responder};
use serde_json::json;

#[get("/health")]
pub async fn api_health() -> impl Responder {
    HttpResponse::Ok().json(json!({"ok": true}))
}
