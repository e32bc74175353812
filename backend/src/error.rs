use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use shared::EnvironmentError;
use std::fmt;
use thiserror::Error;

/// Startup failures: nothing is served until configuration is valid.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Environment(#[from] EnvironmentError),
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl ApiError {
    pub fn new(error: &str, message: &str, status_code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            status_code,
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new("BAD_REQUEST", message, 400)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new("NOT_FOUND", message, 404)
    }

    pub fn internal_error(message: &str) -> Self {
        Self::new("INTERNAL_ERROR", message, 500)
    }

    pub fn bad_gateway(message: &str) -> Self {
        Self::new("BAD_GATEWAY", message, 502)
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let status = match actix_web::http::StatusCode::from_u16(self.status_code) {
            Ok(status) => status,
            Err(_) => {
                log::warn!("Invalid status code {}, defaulting to 500", self.status_code);
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        HttpResponse::build(status).json(self)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::bad_gateway(&format!("Upstream timed out: {}", err))
        } else if err.is_connect() {
            Self::bad_gateway(&format!("Upstream unreachable: {}", err))
        } else {
            Self::bad_gateway(&format!("Upstream error: {}", err))
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(&err.to_string()),
            _ => Self::internal_error(&format!("I/O error: {}", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use actix_web::http::StatusCode;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_api_error_creation() {
        let error = ApiError::new("TEST_ERROR", "Test message", 400);
        assert_eq!(error.error, "TEST_ERROR");
        assert_eq!(error.message, "Test message");
        assert_eq!(error.status_code, 400);
    }

    #[test]
    fn test_bad_gateway_error() {
        let error = ApiError::bad_gateway("Upstream unreachable");
        assert_eq!(error.error, "BAD_GATEWAY");
        assert_eq!(error.status_code, 502);
        assert_eq!(error.to_string(), "BAD_GATEWAY: Upstream unreachable");
    }

    #[test]
    fn test_not_found_error() {
        let error = ApiError::not_found("missing");
        assert_eq!(error.error, "NOT_FOUND");
        assert_eq!(error.status_code, 404);
    }

    #[test]
    fn test_io_error_conversion() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(ApiError::from(missing).status_code, 404);

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(ApiError::from(denied).status_code, 500);
    }

    #[actix_web::test]
    async fn test_error_response_body() {
        let response = ApiError::bad_request("bad path").error_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "error": "BAD_REQUEST",
                "message": "bad path",
                "status_code": 400
            })
        );
    }

    #[actix_web::test]
    async fn test_invalid_status_defaults_to_500() {
        let response = ApiError::new("WEIRD", "odd", 1000).error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_config_error_wraps_environment_error() {
        let err: ConfigError = EnvironmentError::InvalidStaticPath("x".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Static asset path must start and end with '/': x"
        );
    }
}
