use axum::{
    Router,
    extract::{ConnectInfo, State, WebSocketUpgrade},
    response::Response,
    routing::get,
};
use gaze_source::SampleSource;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::GazeCache;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::handlers;
use crate::idle::IdlePolicy;
use crate::metrics::RelayMetrics;
use crate::registry::SessionRegistry;
use crate::sampler::Sampler;
use crate::ws;

/// How long `run` waits for the sampler after the listener stops.
pub const SAMPLER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared handles given to every request and client task.
#[derive(Clone)]
pub struct RelayState {
    pub cache: Arc<GazeCache>,
    pub registry: Arc<SessionRegistry>,
    pub metrics: Arc<RelayMetrics>,
    /// Fired once on shutdown; client handlers and background tasks watch it.
    pub cancel: CancellationToken,
}

impl RelayState {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            cache: Arc::new(GazeCache::new(cache_capacity)),
            registry: Arc::new(SessionRegistry::new()),
            metrics: Arc::new(RelayMetrics::new()),
            cancel: CancellationToken::new(),
        }
    }
}

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

/// All routes: the client socket at `/` and `/ws`, plus health and metrics.
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/", get(ws_upgrade_handler))
        .route("/ws", get(ws_upgrade_handler))
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/sessions", get(handlers::sessions_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<RelayState>,
) -> Response {
    ws.on_upgrade(move |socket| ws::handle_client(socket, Some(remote), state))
}

/// A bound relay, ready to run.
pub struct RelayServer {
    config: RelayConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    source: Box<dyn SampleSource>,
    state: RelayState,
}

impl RelayServer {
    /// Validate the config and bind the listener. Nothing runs until
    /// [`RelayServer::run`].
    pub async fn bind(
        config: RelayConfig,
        source: Box<dyn SampleSource>,
    ) -> Result<Self, RelayError> {
        config.validate()?;
        let addr = config.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RelayError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            state: RelayState::new(config.cache_capacity),
            config,
            listener,
            local_addr,
            source,
        })
    }

    /// Actual listening address (differs from the configured one for port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Token that stops the relay when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.state.cancel.clone()
    }

    pub fn state(&self) -> &RelayState {
        &self.state
    }

    /// Sample and serve until the cancel token fires.
    pub async fn run(self) -> Result<(), RelayError> {
        let RelayServer {
            config,
            listener,
            local_addr,
            source,
            state,
        } = self;
        let cancel = state.cancel.clone();

        let sampler = Sampler::new(
            source,
            state.cache.clone(),
            state.metrics.clone(),
            config.interval,
        )
        .spawn(cancel.clone());

        let idle = config.idle_clear_after.map(|after| {
            IdlePolicy::new(
                after,
                state.cache.clone(),
                state.registry.clone(),
                state.metrics.clone(),
            )
            .spawn(cancel.clone())
        });

        info!("Gaze relay listening on ws://{}/", local_addr);
        info!("Endpoints:");
        info!("  GET /            - WebSocket client protocol");
        info!("  GET /ws          - WebSocket client protocol");
        info!("  GET /health      - Relay status");
        info!("  GET /health/live - Liveness probe");
        info!("  GET /metrics     - Counters snapshot");
        info!("  GET /sessions    - Connected clients");

        let server_result = axum::serve(
            listener,
            router(state.clone()).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await;

        // The listener can also stop on an I/O error; make sure everything follows.
        cancel.cancel();
        info!("Listener closed, stopping sampler...");

        stop_task("sampler", sampler, SAMPLER_STOP_TIMEOUT).await;
        if let Some(idle) = idle {
            stop_task("idle policy", idle, SAMPLER_STOP_TIMEOUT).await;
        }

        let clients = state.registry.count().await;
        let buffered = state.cache.len().await;
        info!(clients, buffered, "Shutdown complete");
        server_result.map_err(RelayError::from)
    }
}

/// Wait for a cancelled task, aborting it if it overruns `timeout`.
///
/// Returns `false` if the task had to be aborted.
async fn stop_task(name: &str, handle: JoinHandle<()>, timeout: Duration) -> bool {
    let abort = handle.abort_handle();
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!("{} task ended abnormally: {}", name, e);
            true
        }
        Err(_) => {
            warn!("{} did not stop within {}ms, aborting", name, timeout.as_millis());
            abort.abort();
            false
        }
    }
}
