//! Static server for the compiled single-page app.
//!
//! Everything under the mount path resolves to a real file from the dist
//! directory when one exists and to `index.html` otherwise, so client-side
//! routes survive a reload.

use actix_files::NamedFile;
use actix_web::{guard, http::header, web, App, HttpRequest, HttpResponse, HttpServer, Route};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use crate::config::FrontendConfig;
use crate::error::ApiError;
use crate::health::health_check;
use crate::middleware::{cors_headers, preflight, Logger};

const INDEX_FILE: &str = "index.html";

#[derive(Debug, Clone)]
pub struct FrontendState {
    pub dist_dir: PathBuf,
    pub mount_path: String,
}

impl FrontendState {
    pub fn new(dist_dir: impl Into<PathBuf>, mount_path: impl Into<String>) -> Self {
        Self {
            dist_dir: dist_dir.into(),
            mount_path: mount_path.into(),
        }
    }

    /// Location the bare host and the bare mount path redirect to.
    pub fn app_root(&self) -> String {
        format!("{}/", self.mount_path)
    }
}

impl From<&FrontendConfig> for FrontendState {
    fn from(config: &FrontendConfig) -> Self {
        Self::new(config.dist_dir.clone(), config.mount_path.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Index,
    File(PathBuf),
}

/// Maps a request path relative to the dist directory onto a file.
///
/// Returns `None` for paths that try to leave the dist directory.
fn safe_join(dist_dir: &Path, relative: &str) -> Option<PathBuf> {
    let mut path = dist_dir.to_path_buf();
    for segment in relative.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            s if s.contains('\\') || s.contains('\0') => return None,
            s => path.push(s),
        }
    }
    Some(path)
}

/// Resolves a path below the mount point: directories and unknown paths
/// fall back to the app shell.
pub fn resolve_app_path(dist_dir: &Path, rest: &str) -> Result<Resolved, ApiError> {
    if rest.is_empty() || rest.ends_with('/') {
        return Ok(Resolved::Index);
    }

    let path = safe_join(dist_dir, rest)
        .ok_or_else(|| ApiError::not_found(&format!("No such file: {}", rest)))?;

    if path.is_file() {
        Ok(Resolved::File(path))
    } else {
        Ok(Resolved::Index)
    }
}

/// Resolves a path outside the mount point: only real files are served.
pub fn resolve_dist_path(dist_dir: &Path, rest: &str) -> Result<Resolved, ApiError> {
    let not_found = || ApiError::not_found(&format!("No such file: /{}", rest));
    let path = safe_join(dist_dir, rest).ok_or_else(not_found)?;

    if path.is_file() {
        Ok(Resolved::File(path))
    } else {
        Err(not_found())
    }
}

async fn respond(
    state: &FrontendState,
    resolved: Resolved,
    req: &HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let path = match resolved {
        Resolved::Index => state.dist_dir.join(INDEX_FILE),
        Resolved::File(path) => path,
    };
    debug!("Serving {}", path.display());

    let file = NamedFile::open_async(&path).await?;
    Ok(file.into_response(req))
}

async fn redirect_to_app(state: web::Data<FrontendState>) -> HttpResponse {
    HttpResponse::MovedPermanently()
        .insert_header((header::LOCATION, state.app_root()))
        .finish()
}

async fn serve_app(
    req: HttpRequest,
    state: web::Data<FrontendState>,
) -> Result<HttpResponse, ApiError> {
    let rest = req.match_info().query("tail");
    let resolved = resolve_app_path(&state.dist_dir, rest)?;
    respond(&state, resolved, &req).await
}

async fn serve_dist(
    req: HttpRequest,
    state: web::Data<FrontendState>,
) -> Result<HttpResponse, ApiError> {
    let rest = req.match_info().query("tail");
    let resolved = resolve_dist_path(&state.dist_dir, rest)?;
    respond(&state, resolved, &req).await
}

/// Matches GET and HEAD.
fn read_only() -> Route {
    web::route().guard(guard::Any(guard::Get()).or(guard::Head()))
}

pub fn configure(cfg: &mut web::ServiceConfig, state: web::Data<FrontendState>) {
    let mount = state.mount_path.clone();

    cfg.app_data(state).service(preflight()).service(health_check);

    if mount.is_empty() {
        cfg.route("/{tail:.*}", read_only().to(serve_app));
    } else {
        cfg.route("/", read_only().to(redirect_to_app))
            .route(&mount, read_only().to(redirect_to_app))
            .route(&format!("{}/{{tail:.*}}", mount), read_only().to(serve_app))
            .route("/{tail:.*}", read_only().to(serve_dist));
    }
}

pub async fn run(config: FrontendConfig) -> std::io::Result<()> {
    let state = web::Data::new(FrontendState::from(&config));

    info!(
        "Serving frontend at http://{}:{}{}",
        config.host,
        config.port,
        state.app_root()
    );
    info!("Serving directory: {}", config.dist_dir.display());
    if !config.dist_dir.join(INDEX_FILE).is_file() {
        warn!(
            "{} has no {}; app routes will answer 404",
            config.dist_dir.display(),
            INDEX_FILE
        );
    }

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
    .await?;

    info!("Frontend server stopped");
    Ok(())
}
