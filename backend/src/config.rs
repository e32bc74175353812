use std::env;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use dotenv::dotenv;
use log::{info, warn};
use shared::environment::{check_absolute_url, ACTIVE, ACTIVE_ENVIRONMENT};
use url::{Host, Url};
pub use shared::Environment;

use crate::error::ConfigError;

const DEFAULT_DIST_DIR: &str = "static/frontend/reddit-app/dist";
const DEFAULT_UPSTREAM_URL: &str = "http://localhost:8000";
const DEFAULT_UPSTREAM_COMMAND: &str = "python manage.py runserver 0.0.0.0:8000";

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub frontend: FrontendConfig,
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrontendConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    /// Directory holding the compiled app (`index.html`, bundles, `assets/`).
    pub dist_dir: PathBuf,
    /// Path prefix the app is served under, e.g. `/django_reddit`.
    pub mount_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub upstream_url: String,
    /// Command line of a process to supervise as the upstream.
    pub upstream_command: Option<String>,
    pub startup_delay: Duration,
    pub timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_env_files();

        let environment: Environment = env::var("RUST_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .parse()
            .unwrap_or_default();

        info!("Loading configuration for environment: {}", environment);

        let config = Self::from_lookup(environment, |key| env::var(key).ok())?;
        config.validate()?;
        config.log_configuration();

        Ok(config)
    }

    fn load_env_files() {
        // ENV_FILE_PATH replaces the .env / .env.<environment> lookup entirely
        if let Ok(env_file_path) = env::var("ENV_FILE_PATH") {
            if !env_file_path.is_empty() {
                info!("Loading environment from ENV_FILE_PATH: {}", env_file_path);
                if let Err(e) = dotenv::from_filename(&env_file_path) {
                    warn!("Could not read {}: {}", env_file_path, e);
                }
                return;
            }
        }

        dotenv().ok();
        let environment_hint: Environment = env::var("RUST_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .parse()
            .unwrap_or_default();
        if environment_hint != Environment::Development {
            let env_file = format!(".env.{}", environment_hint);
            if let Err(e) = load_optional_env_file(&env_file) {
                warn!("Ignoring {}: {}", env_file, e);
            }
        }
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(environment: Environment, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Config {
            environment,
            frontend: Self::load_frontend_config(environment, &lookup)?,
            proxy: Self::load_proxy_config(environment, &lookup),
        })
    }

    fn load_frontend_config<F>(env: Environment, lookup: &F) -> Result<FrontendConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default_workers = match env {
            Environment::Development => 1,
            Environment::Production => 4,
        };

        let mount_path = match lookup("APP_MOUNT_PATH") {
            Some(path) => path.trim_end_matches('/').to_string(),
            None => ACTIVE.app_mount_path()?,
        };

        Ok(FrontendConfig {
            host: lookup("FRONTEND_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(lookup, "FRONTEND_PORT", 12001),
            workers: parse_or(lookup, "FRONTEND_WORKERS", default_workers),
            dist_dir: lookup("FRONTEND_DIST_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DIST_DIR)),
            mount_path,
        })
    }

    fn load_proxy_config<F>(env: Environment, lookup: &F) -> ProxyConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let (default_workers, default_timeout) = match env {
            Environment::Development => (1, 30),
            Environment::Production => (4, 120),
        };

        // An explicitly empty UPSTREAM_COMMAND disables supervision
        let upstream_command = match lookup("UPSTREAM_COMMAND") {
            Some(command) if command.trim().is_empty() => None,
            Some(command) => Some(command),
            None if env == Environment::Development => Some(DEFAULT_UPSTREAM_COMMAND.to_string()),
            None => None,
        };

        ProxyConfig {
            host: lookup("PROXY_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(lookup, "PROXY_PORT", 12000),
            workers: parse_or(lookup, "PROXY_WORKERS", default_workers),
            upstream_url: lookup("UPSTREAM_URL")
                .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            upstream_command,
            startup_delay: Duration::from_secs(parse_or(lookup, "UPSTREAM_STARTUP_DELAY_SECS", 2)),
            timeout: Duration::from_secs(parse_or(lookup, "UPSTREAM_TIMEOUT_SECS", default_timeout)),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ACTIVE.validate()?;

        if self.frontend.port == 0 || self.proxy.port == 0 {
            return Err(ConfigError::Invalid("Server port cannot be 0".into()));
        }
        if self.frontend.workers == 0 || self.proxy.workers == 0 {
            return Err(ConfigError::Invalid("Worker count cannot be 0".into()));
        }

        let mount = &self.frontend.mount_path;
        if !mount.is_empty() && !mount.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "Mount path must start with '/': {}",
                mount
            )));
        }

        check_absolute_url("UPSTREAM_URL", &self.proxy.upstream_url)?;

        if self.is_production() {
            if ACTIVE_ENVIRONMENT != Environment::Production {
                return Err(ConfigError::Invalid(
                    "RUST_ENV is production but the frontend environment was built for development"
                        .into(),
                ));
            }
            if is_loopback_url(&self.proxy.upstream_url) && self.proxy.upstream_command.is_none() {
                return Err(ConfigError::Invalid(
                    "Production upstream URL cannot point at localhost without UPSTREAM_COMMAND"
                        .into(),
                ));
            }
        }

        Ok(())
    }

    fn log_configuration(&self) {
        info!("Configuration loaded successfully");
        info!("Environment: {} (frontend build: {})", self.environment, ACTIVE_ENVIRONMENT);
        info!(
            "Frontend: {}:{} (workers: {}) serving {} at {}/",
            self.frontend.host,
            self.frontend.port,
            self.frontend.workers,
            self.frontend.dist_dir.display(),
            self.frontend.mount_path
        );
        info!(
            "Proxy: {}:{} (workers: {}) -> {}",
            self.proxy.host, self.proxy.port, self.proxy.workers, self.proxy.upstream_url
        );
        match &self.proxy.upstream_command {
            Some(command) => info!("Upstream command: {}", command),
            None => info!("Upstream is not supervised"),
        }

        if self.is_development() {
            warn!("Running in development mode");
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

/// Loads an env file if it exists. A missing file is not an error, a
/// malformed one is.
fn load_optional_env_file(path: &str) -> Result<(), dotenv::Error> {
    match dotenv::from_filename(path) {
        Ok(_) => Ok(()),
        Err(dotenv::Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Whether `url` points at this machine (`localhost` or a loopback address).
fn is_loopback_url(url: &str) -> bool {
    match Url::parse(url).ok().as_ref().and_then(Url::host) {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(addr)) => addr.is_loopback(),
        Some(Host::Ipv6(addr)) => addr.is_loopback(),
        None => false,
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={:?}", key, raw);
            default
        }),
        None => default,
    }
}
