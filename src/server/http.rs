//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling; WebSocket upgrades are enabled on every
//! connection.

use bytes::Bytes;
use http_body_util::Full;
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

use crate::channel::{ChannelRegistry, Dispatcher};
use crate::config::Args;
use crate::routes;
use crate::server::websocket;
use crate::topology::{
    Directory, ProbeContext, ProbeCoordinator, Prober, RestDirectory, RestProber,
};
use crate::types::TopologyError;
use crate::worker::ProbePool;

/// Shared application state
///
/// Owns the topology session: the coordinator, and with it the status cache, in-flight set and
/// probe pool, live exactly as long as this state.
pub struct AppState {
    pub args: Args,
    /// Coalescing coordinator over the shared status cache
    pub coordinator: Arc<ProbeCoordinator>,
    /// Inbound frame router for push channels
    pub dispatcher: Arc<Dispatcher>,
    /// Attached push channels by correlation key
    pub channels: Arc<ChannelRegistry>,
    pub started_at: Instant,
}

impl AppState {
    /// Create AppState backed by the REST directory and prober.
    ///
    /// Must be called inside a tokio runtime (the probe pool starts its workers here).
    pub fn new(args: Args) -> Result<Self, TopologyError> {
        let timeout = args.probe_timeout();
        let directory = Arc::new(RestDirectory::new(&args.backend_url, timeout)?);
        let prober = Arc::new(RestProber::new(&args.backend_url, timeout)?);
        Ok(Self::with_collaborators(args, directory, prober))
    }

    /// Create AppState with explicit collaborators
    pub fn with_collaborators(
        args: Args,
        directory: Arc<dyn Directory>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        let pool = ProbePool::new(args.pool_config());
        let coordinator = Arc::new(ProbeCoordinator::new(directory, prober, pool));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&coordinator)));

        Self {
            args,
            coordinator,
            dispatcher,
            channels: Arc::new(ChannelRegistry::new()),
            started_at: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), TopologyError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Topology status service listening on {}", state.args.listen);
    info!("Push channel at /topology/ws, batch poll at /topology/batch");

    if state.args.dev_mode {
        warn!("Development mode enabled - channels may attach without a session");
    }

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
                        .with_upgrades()
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
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        // Liveness probe
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state))
        }

        (Method::GET, "/version") => routes::version_info(),

        // Runtime stats: cache, in-flight probes, pool, channels
        (Method::GET, "/status") => routes::status_check(Arc::clone(&state)),

        // Push channel
        (Method::GET, "/topology/ws") => {
            if hyper_tungstenite::is_upgrade_request(&req) {
                websocket::handle_topology_upgrade(Arc::clone(&state), req).await
            } else {
                routes::bad_request_response("Push channel requires WebSocket upgrade")
            }
        }

        // Batch completion poll
        (Method::GET, "/topology/batch") => {
            handle_poll(Arc::clone(&state), &req, routes::handle_batch_query)
        }

        // Read-only status lookup
        (Method::GET, "/topology/status") => {
            handle_poll(Arc::clone(&state), &req, routes::handle_status_query)
        }

        // CORS preflight
        (Method::OPTIONS, _) => preflight_response(),

        _ => routes::not_found_response(&path),
    };

    Ok(response)
}

/// Polling endpoints answer for the caller's session and tenant, resolved like the push channel
fn handle_poll<B>(
    state: Arc<AppState>,
    req: &Request<B>,
    handler: fn(Arc<AppState>, Option<&str>, &ProbeContext) -> Response<Full<Bytes>>,
) -> Response<Full<Bytes>> {
    match websocket::resolve_attachment(&state, req) {
        Ok(attachment) => handler(state, req.uri().query(), &attachment.context),
        Err(err_msg) => {
            debug!("Topology poll refused: {}", err_msg);
            routes::unauthorized_response(&err_msg)
        }
    }
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}
