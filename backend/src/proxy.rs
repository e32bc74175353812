//! Reverse proxy in front of the API server.
//!
//! Requests are forwarded verbatim (method, path, query, headers, body) and
//! the upstream answer is relayed unchanged, error statuses included.
//! Preflight requests are answered locally.

use actix_web::{http::StatusCode, web, App, HttpRequest, HttpResponse, HttpServer};
use anyhow::Context;
use log::{debug, error, info};
use std::time::Duration;

use crate::config::ProxyConfig;
use crate::error::ApiError;
use crate::middleware::{cors_headers, preflight, Logger};
use crate::upstream::Upstream;

/// Largest request body forwarded upstream (image uploads included).
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

#[derive(Debug, Clone)]
pub struct ProxyState {
    client: reqwest::Client,
    upstream_url: String,
}

impl ProxyState {
    pub fn new(upstream_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            upstream_url: upstream_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn upstream_url(&self) -> &str {
        &self.upstream_url
    }

    /// Upstream URL for an incoming request, query string included.
    pub fn target(&self, req: &HttpRequest) -> String {
        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        format!("{}{}", self.upstream_url, path_and_query)
    }
}

pub async fn forward(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<ProxyState>,
) -> Result<HttpResponse, ApiError> {
    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|_| ApiError::bad_request(&format!("Unsupported method {}", req.method())))?;
    let target = state.target(&req);
    debug!("Forwarding {} {}", method, target);

    let mut upstream = state.client.request(method, &target);
    for (name, value) in req.headers() {
        let name = name.as_str();
        if is_hop_by_hop(name) || name == "host" || name == "content-length" {
            continue;
        }
        upstream = upstream.header(name, value.as_bytes());
    }

    let response = upstream.body(body.to_vec()).send().await?;

    let status = StatusCode::from_u16(response.status().as_u16())
        .map_err(|_| ApiError::bad_gateway("Upstream returned an invalid status"))?;
    let mut builder = HttpResponse::build(status);
    for (name, value) in response.headers() {
        let name = name.as_str();
        if is_hop_by_hop(name) || name == "content-length" {
            continue;
        }
        builder.append_header((name, value.as_bytes()));
    }

    let bytes = response.bytes().await?;
    Ok(builder.body(bytes.to_vec()))
}

pub fn configure(cfg: &mut web::ServiceConfig, state: web::Data<ProxyState>) {
    cfg.app_data(state)
        .app_data(web::PayloadConfig::new(MAX_BODY_BYTES))
        .service(preflight())
        .route("/{tail:.*}", web::route().to(forward));
}

/// Starts the supervised upstream (if any), serves until shutdown, then
/// stops the upstream again.
pub async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    let upstream = match &config.upstream_command {
        Some(command) => {
            let mut upstream = Upstream::spawn(command)
                .with_context(|| format!("Failed to start upstream '{}'", command))?;
            tokio::time::sleep(config.startup_delay).await;
            if !upstream.is_running()? {
                let status = upstream.shutdown().await?;
                anyhow::bail!("Upstream '{}' exited during startup ({})", command, status);
            }
            Some(upstream)
        }
        None => None,
    };

    let state = web::Data::new(
        ProxyState::new(&config.upstream_url, config.timeout)
            .context("Failed to build upstream HTTP client")?,
    );

    info!("Starting proxy server at http://{}:{}", config.host, config.port);
    info!("Forwarding to {}", state.upstream_url());

    let served = serve(&config, state).await;

    if let Some(upstream) = upstream {
        if let Err(e) = upstream.shutdown().await {
            error!("Failed to stop upstream: {}", e);
        }
    }

    served.context("Proxy server failed")
}

async fn serve(config: &ProxyConfig, state: web::Data<ProxyState>) -> std::io::Result<()> {
    HttpServer::new(move || {
        let state = state.clone();
        App::new()
            .wrap(cors_headers())
            .wrap(Logger)
            .configure(move |cfg| configure(cfg, state))
    })
    .workers(config.workers)
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
