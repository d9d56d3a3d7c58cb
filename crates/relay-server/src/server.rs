use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use relay_core::{Dispatcher, DispatcherOptions};
use relay_telemetry::MetricsRecorder;
use tokio::sync::{mpsc, oneshot, watch};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::client::{self, ClientRegistry};
use crate::config::ServerConfig;
use crate::dispatch::{self, TransportEvent};
use crate::error::ServerError;

/// How long `shutdown` waits for in-flight HTTP requests.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub clients: Arc<ClientRegistry>,
    pub events: mpsc::Sender<TransportEvent>,
    pub roster: watch::Receiver<Vec<String>>,
    pub metrics: Arc<MetricsRecorder>,
    pub heartbeat_interval: Duration,
}

/// Build the Axum router: WebSocket endpoint, health, and the static client.
pub fn build_router(state: AppState, public_dir: &Path) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route_service("/", ServeFile::new(public_dir.join("index.html")))
        .fallback_service(ServeDir::new(public_dir))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle to shut it down.
pub async fn start(
    config: ServerConfig,
    metrics: Arc<MetricsRecorder>,
) -> Result<ServerHandle, ServerError> {
    let clients = Arc::new(ClientRegistry::new(
        config.max_send_queue,
        config.client_timeout(),
    ));

    let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(config.event_queue);
    let (roster_tx, roster_rx) = watch::channel(Vec::new());

    let dispatcher = Dispatcher::new(DispatcherOptions {
        require_valid_names: config.require_valid_names,
    });
    let dispatch_handle = tokio::spawn(dispatch::run_dispatch_loop(
        event_rx,
        dispatcher,
        Arc::clone(&clients),
        roster_tx,
        Arc::clone(&metrics),
    ));

    let cleanup = client::start_cleanup_task(Arc::clone(&clients), config.cleanup_interval());

    if !config.public_dir.join("index.html").is_file() {
        tracing::warn!(
            public_dir = %config.public_dir.display(),
            "index.html not found, the browser client will not be served"
        );
    }

    let state = AppState {
        clients,
        events: event_tx,
        roster: roster_rx,
        metrics,
        heartbeat_interval: config.heartbeat_interval(),
    };
    let router = build_router(state, &config.public_dir);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, "Relay server started");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        if let Err(e) = serve.await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok(ServerHandle {
        addr: local_addr,
        shutdown_tx: Some(shutdown_tx),
        server,
        dispatch: dispatch_handle,
        cleanup,
    })
}

/// Handle returned by `start()`. Keeps background tasks alive.
pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: tokio::task::JoinHandle<()>,
    dispatch: tokio::task::JoinHandle<()>,
    cleanup: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop accepting connections and tear down background tasks.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.server).await.is_err() {
            tracing::warn!("Graceful shutdown timed out, aborting server task");
            self.server.abort();
        }
        self.cleanup.abort();
        self.dispatch.abort();
        tracing::info!("Relay server stopped");
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a new WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (connection_id, rx) = state.clients.register();
    tracing::info!(connection_id = %connection_id, "WebSocket client connected");

    if state
        .events
        .send(TransportEvent::Connected(connection_id.clone()))
        .await
        .is_err()
    {
        tracing::warn!(connection_id = %connection_id, "Dispatch loop gone, closing connection");
        state.clients.unregister(&connection_id);
        return;
    }

    client::handle_ws_connection(
        socket,
        connection_id,
        rx,
        state.clients,
        state.events,
        state.heartbeat_interval,
    )
    .await;
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let users = state.roster.borrow().clone();
    Json(serde_json::json!({
        "status": "ok",
        "connections": state.clients.count(),
        "users": users,
        "metrics": state.metrics.snapshot(),
    }))
}
