//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one task per connection.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::audit::{spawn_audit_retry_task, AuditLog};
use crate::config::Args;
use crate::db::Stores;
use crate::logging::ActivityLogger;
use crate::routes;
use crate::services::{MagicLinkConfig, MagicLinkService};
use crate::types::GateError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub service: Arc<MagicLinkService>,
    pub audit: Arc<AuditLog>,
    pub activity: ActivityLogger,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the services over `stores` according to `args`
    pub async fn build(args: Args, stores: Stores) -> Result<Self, GateError> {
        let tokens = args.token_service()?;

        let activity = ActivityLogger::new();
        if let Some(path) = &args.activity_log_path {
            activity.init_file(path.clone()).await?;
        }

        let audit = Arc::new(AuditLog::new(stores.events.clone(), args.audit_write_mode));
        let service = Arc::new(MagicLinkService::new(
            &stores,
            tokens,
            Arc::clone(&audit),
            activity.clone(),
            MagicLinkConfig {
                single_use: args.single_use_links,
            },
        ));

        Ok(Self {
            args,
            service,
            audit,
            activity,
            started_at: Instant::now(),
        })
    }
}

/// Run the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), GateError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("passport-gate listening on {}", state.args.listen);

    if state.args.dev_mode {
        warn!("Development mode enabled - fixed signing secret may be in use");
    }
    if state.args.admin_api_key.is_none() {
        warn!("ADMIN_API_KEY not set - admin endpoints are open");
    }

    spawn_audit_retry_task(
        Arc::clone(&state.audit),
        Duration::from_secs(state.args.audit_retry_interval_secs),
    );
    info!(
        "Audit retry task started (every {}s, mode {})",
        state.args.audit_retry_interval_secs,
        state.audit.mode().as_str()
    );

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("[{}] {} {}", addr, method, path);

    if path.starts_with("/api/v1/") {
        if let Some(response) = routes::handle_api_request(req, Arc::clone(&state)).await {
            return Ok(response);
        }
        return Ok(to_boxed(not_found_response(&path)));
    }

    let response = match (method, path.as_str()) {
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            to_boxed(routes::health_check(Arc::clone(&state)).await)
        }

        (Method::GET, "/version") => to_boxed(routes::version_info()),

        (Method::OPTIONS, _) => to_boxed(preflight_response()),

        _ => to_boxed(not_found_response(&path)),
    };

    Ok(response)
}

fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path,
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
