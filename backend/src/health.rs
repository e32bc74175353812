use actix_web::{get, HttpResponse, Responder};
use serde::Serialize;
use shared::{Environment, ACTIVE_ENVIRONMENT};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: &'static str,
    /// Which endpoint set the served frontend was built with.
    pub environment: Environment,
    pub production: bool,
}

#[get("/health")]
pub async fn health_check() -> impl Responder {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        timestamp,
        version: env!("CARGO_PKG_VERSION"),
        environment: ACTIVE_ENVIRONMENT,
        production: ACTIVE_ENVIRONMENT.is_production(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};
    use pretty_assertions::assert_eq;

    #[actix_web::test]
    async fn test_health_check() {
        let app = test::init_service(App::new().service(health_check)).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["environment"], ACTIVE_ENVIRONMENT.to_string());
        assert_eq!(body["production"], ACTIVE_ENVIRONMENT.is_production());
        assert!(body["timestamp"].as_u64().unwrap() > 0);
    }
}
