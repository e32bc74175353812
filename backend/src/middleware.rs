use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::middleware::DefaultHeaders;
use actix_web::{guard, web, HttpResponse, Resource};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use log::{error, info, warn};
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Instant;
use uuid::Uuid;

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "GET, POST, OPTIONS, PUT, DELETE";
pub const ALLOW_HEADERS: &str = "X-Requested-With, Content-Type, Authorization";

/// Request id attached to each request's extensions and echoed back.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Access log with a per-request id, levelled by response status.
pub struct Logger;

impl<S, B> Transform<S, ServiceRequest> for Logger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = LoggerMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(LoggerMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct LoggerMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for LoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();
        let start_time = Instant::now();
        let method = req.method().clone();
        let uri = req.uri().clone();
        let peer_addr = req
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let request_id = Uuid::new_v4().to_string();
        req.extensions_mut().insert(RequestId(request_id.clone()));

        Box::pin(async move {
            let mut res = svc.call(req).await?;
            let duration = start_time.elapsed();

            if let Ok(header_value) = HeaderValue::try_from(request_id.as_str()) {
                res.headers_mut()
                    .insert(HeaderName::from_static("x-request-id"), header_value);
            }

            let status_code = res.status().as_u16();
            let line = format!(
                "request_id={} {} {} {} {}ms {}",
                request_id,
                method,
                uri,
                status_code,
                duration.as_millis(),
                peer_addr
            );

            if status_code >= 500 {
                error!("{}", line);
            } else if status_code >= 400 {
                warn!("{}", line);
            } else {
                info!("{}", line);
            }

            Ok(res)
        })
    }
}

/// Permissive CORS headers added to every response that lacks them.
pub fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", ALLOW_ORIGIN))
        .add(("Access-Control-Allow-Methods", ALLOW_METHODS))
        .add(("Access-Control-Allow-Headers", ALLOW_HEADERS))
}

/// Answers `OPTIONS` on any path with an empty `200`; register it first.
pub fn preflight() -> Resource {
    web::resource("/{any:.*}")
        .guard(guard::Options())
        .to(|| async { HttpResponse::Ok().finish() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::Method, http::StatusCode, test, App};
    use pretty_assertions::assert_eq;

    #[actix_web::test]
    async fn test_logger_sets_request_id() {
        let app = test::init_service(
            App::new()
                .wrap(Logger)
                .route("/test", web::get().to(|| async { "test" })),
        )
        .await;

        let req = test::TestRequest::get().uri("/test").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let id = resp.headers().get("x-request-id").unwrap().to_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[actix_web::test]
    async fn test_request_id_visible_to_handlers() {
        let app = test::init_service(App::new().wrap(Logger).route(
            "/id",
            web::get().to(|req: actix_web::HttpRequest| async move {
                let id = req
                    .extensions()
                    .get::<RequestId>()
                    .map(|id| id.0.clone())
                    .unwrap_or_default();
                HttpResponse::Ok().body(id)
            }),
        ))
        .await;

        let req = test::TestRequest::get().uri("/id").to_request();
        let resp = test::call_service(&app, req).await;
        let header = resp
            .headers()
            .get("x-request-id")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let body = test::read_body(resp).await;

        assert_eq!(body, header.as_bytes());
    }

    #[actix_web::test]
    async fn test_logger_passes_error_statuses_through() {
        let app = test::init_service(
            App::new()
                .wrap(Logger)
                .route(
                    "/error",
                    web::get().to(|| async { HttpResponse::InternalServerError().finish() }),
                )
                .route(
                    "/missing",
                    web::get().to(|| async { HttpResponse::NotFound().finish() }),
                ),
        )
        .await;

        let req = test::TestRequest::get().uri("/error").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let req = test::TestRequest::get().uri("/missing").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_cors_headers_added() {
        let app = test::init_service(
            App::new()
                .wrap(cors_headers())
                .route("/test", web::get().to(|| async { "test" })),
        )
        .await;

        let req = test::TestRequest::get().uri("/test").to_request();
        let resp = test::call_service(&app, req).await;
        let headers = resp.headers();

        assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
        assert_eq!(
            headers.get("access-control-allow-methods").unwrap(),
            "GET, POST, OPTIONS, PUT, DELETE"
        );
        assert_eq!(
            headers.get("access-control-allow-headers").unwrap(),
            "X-Requested-With, Content-Type, Authorization"
        );
    }

    #[actix_web::test]
    async fn test_cors_headers_do_not_override_handler() {
        let app = test::init_service(App::new().wrap(cors_headers()).route(
            "/own",
            web::get().to(|| async {
                HttpResponse::Ok()
                    .insert_header(("Access-Control-Allow-Origin", "https://example.com"))
                    .finish()
            }),
        ))
        .await;

        let req = test::TestRequest::get().uri("/own").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "https://example.com"
        );
    }

    #[actix_web::test]
    async fn test_preflight_answers_options_only() {
        let app = test::init_service(
            App::new()
                .wrap(cors_headers())
                .service(preflight())
                .route("/posts/", web::get().to(|| async { "posts" })),
        )
        .await;

        let req = test::TestRequest::default()
            .method(Method::OPTIONS)
            .uri("/posts/")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("access-control-allow-origin").unwrap(), "*");

        let req = test::TestRequest::get().uri("/posts/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, "posts");
    }
}
