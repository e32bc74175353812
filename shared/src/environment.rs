//! Endpoint sets for each deployment target of the reddit-app frontend.
//!
//! Exactly one of them is active per build: [`ACTIVE`] resolves to
//! [`PRODUCTION`] when the crate is compiled with the `production` feature
//! and to [`DEVELOPMENT`] otherwise.

use crate::error::{EnvironmentError, Result};
use log::warn;
use serde::Serialize;
use std::fmt;
use url::Url;

/// Deployment target a build (or a running process) is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// The static endpoint set for this target.
    pub fn config(self) -> EnvironmentConfig {
        match self {
            Environment::Development => DEVELOPMENT,
            Environment::Production => PRODUCTION,
        }
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = EnvironmentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(EnvironmentError::UnknownEnvironment(s.to_string())),
        }
    }
}

/// Endpoint URLs the frontend is built against.
///
/// Values are fixed at compile time and never change while the process
/// runs. Serializes to the six camelCase keys the frontend bundle reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfig {
    pub production: bool,
    /// Root of the REST API, used as a prefix for every API call.
    pub base_url: &'static str,
    /// Root of the backend host.
    pub server_url: &'static str,
    /// Root of the app mount point.
    pub app_url: &'static str,
    /// Sign-in entry point, conventionally under `app_url`.
    pub login_url: &'static str,
    /// Root-relative prefix for images and other static assets.
    pub static_url: &'static str,
}

pub const PRODUCTION: EnvironmentConfig = EnvironmentConfig {
    production: true,
    base_url: "https://work-1-nzwyroghofseggzd.prod-runtime.all-hands.dev/api/v1/",
    server_url: "https://work-1-nzwyroghofseggzd.prod-runtime.all-hands.dev",
    app_url: "https://work-2-nzwyroghofseggzd.prod-runtime.all-hands.dev/django_reddit",
    login_url: "https://work-2-nzwyroghofseggzd.prod-runtime.all-hands.dev/django_reddit/sign-in",
    static_url: "/django_reddit/assets/images/",
};

// Local proxy on 12000, frontend server on 12001.
pub const DEVELOPMENT: EnvironmentConfig = EnvironmentConfig {
    production: false,
    base_url: "http://localhost:12000/api/v1/",
    server_url: "http://localhost:12000",
    app_url: "http://localhost:12001/django_reddit",
    login_url: "http://localhost:12001/django_reddit/sign-in",
    static_url: "/django_reddit/assets/images/",
};

#[cfg(feature = "production")]
pub const ACTIVE: EnvironmentConfig = PRODUCTION;
#[cfg(not(feature = "production"))]
pub const ACTIVE: EnvironmentConfig = DEVELOPMENT;

#[cfg(feature = "production")]
pub const ACTIVE_ENVIRONMENT: Environment = Environment::Production;
#[cfg(not(feature = "production"))]
pub const ACTIVE_ENVIRONMENT: Environment = Environment::Development;

impl EnvironmentConfig {
    /// Checks the authoring-time invariants of an endpoint set.
    ///
    /// `login_url` living outside `app_url` is only a convention, so it is
    /// reported with a warning and does not fail validation.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in self.absolute_urls() {
            check_absolute_url(field, value)?;
        }

        if !self.static_url.starts_with('/') || !self.static_url.ends_with('/') {
            return Err(EnvironmentError::InvalidStaticPath(
                self.static_url.to_string(),
            ));
        }

        if !self.login_url.starts_with(self.app_url) {
            warn!(
                "loginUrl {} is not under appUrl {}",
                self.login_url, self.app_url
            );
        }

        Ok(())
    }

    /// Path component of `app_url` without a trailing slash, e.g.
    /// `/django_reddit`. Empty when the app is mounted at the host root.
    pub fn app_mount_path(&self) -> Result<String> {
        let url = parse_url("appUrl", self.app_url)?;
        Ok(url.path().trim_end_matches('/').to_string())
    }

    /// Full URL of an API endpoint relative to `base_url`.
    pub fn api_endpoint(&self, path: &str) -> String {
        join(self.base_url, path)
    }

    /// Root-relative path of a static asset under `static_url`.
    pub fn static_asset(&self, name: &str) -> String {
        join(self.static_url, name)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    fn absolute_urls(&self) -> [(&'static str, &'static str); 4] {
        [
            ("baseUrl", self.base_url),
            ("serverUrl", self.server_url),
            ("appUrl", self.app_url),
            ("loginUrl", self.login_url),
        ]
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| EnvironmentError::InvalidUrl {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Absolute means an http(s) scheme and a host.
pub fn check_absolute_url(field: &'static str, value: &str) -> Result<()> {
    let url = parse_url(field, value)?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(EnvironmentError::InvalidUrl {
            field,
            value: value.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(EnvironmentError::InvalidUrl {
            field,
            value: value.to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(())
}

fn join(prefix: &str, path: &str) -> String {
    format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
