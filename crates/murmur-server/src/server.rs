//! `MurmurServer`: Axum HTTP + `WebSocket` server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::responder::Responder;
use crate::websocket::connection::ClientConnection;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::session::{SessionContext, run_ws_session};

/// How long [`MurmurServer::shutdown`] waits for the serve task by default.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Per-session wiring.
    pub session: SessionContext,
    /// When the server started.
    pub start_time: Instant,
    /// Max inbound WebSocket message size.
    pub max_message_size: usize,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The murmur server.
pub struct MurmurServer {
    config: ServerConfig,
    responder: Responder,
    registry: Arc<ConnectionRegistry>,
    shutdown: CancellationToken,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl MurmurServer {
    /// Create a server that streams mock replies.
    pub fn new(config: ServerConfig) -> Self {
        let responder = Responder::from_config(&config);
        Self::with_responder(config, responder)
    }

    /// Create a server with a custom responder.
    pub fn with_responder(config: ServerConfig, responder: Responder) -> Self {
        Self {
            config,
            responder,
            registry: Arc::new(ConnectionRegistry::new()),
            shutdown: CancellationToken::new(),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from this Prometheus handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            session: SessionContext {
                responder: self.responder.clone(),
                registry: self.registry.clone(),
                shutdown: self.shutdown.clone(),
                inbound_queue: self.config.inbound_queue,
                outbound_queue: self.config.outbound_queue,
                ping_interval: self.config.heartbeat_interval(),
                pong_timeout: self.config.heartbeat_timeout(),
            },
            start_time: self.start_time,
            max_message_size: self.config.max_message_size,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.clone();

        info!(%addr, "server listening");

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        });

        Ok((addr, handle))
    }

    /// Live connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Stop accepting connections and close every live session.
    ///
    /// Sessions send a Close frame and stop their cycles; any events a
    /// cycle still produces are dropped.
    pub fn begin_shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        info!(sessions = self.registry.count(), "shutting down");
        self.registry.close_all();
        self.shutdown.cancel();
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Begin shutdown, then wait up to `timeout` for the `serve` task from
    /// [`listen`](Self::listen) to finish.
    ///
    /// Returns `false` if the task was still running at the deadline.
    pub async fn shutdown(&self, serve: JoinHandle<()>, timeout: Duration) -> bool {
        self.begin_shutdown();
        match tokio::time::timeout(timeout, serve).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(error = %e, "serve task failed");
                true
            }
            Err(_) => {
                warn!(
                    live_sessions = self.registry.count(),
                    "shutdown timed out after {timeout:?}"
                );
                false
            }
        }
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET / and GET /ws: `WebSocket` upgrade.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let conn_id = ClientConnection::new_id();
    let ctx = state.session.clone();
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, conn_id, ctx))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.session.registry.count(),
    ))
}

/// GET /metrics in Prometheus text format.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
