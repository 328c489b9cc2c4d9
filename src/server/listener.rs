//! Relay server listener
//!
//! Routes requests with axum: the status page at `/`, the producer and
//! viewer WebSocket endpoints at their configured paths, 404 elsewhere.
//! Every upgraded connection runs as one tracked task.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::serve::ListenerExt;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{Error, Result};
use crate::registry::SubscriberRegistry;
use crate::server::config::ServerConfig;
use crate::server::ingest::IngestSession;
use crate::server::status;
use crate::server::viewer;
use crate::session::IngestSlot;

/// How long shutdown waits for connection tasks to finish
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// State shared by every request handler and connection task
pub(crate) struct RelayState {
    pub(crate) config: ServerConfig,
    pub(crate) registry: Arc<SubscriberRegistry>,
    pub(crate) ingest_slot: Arc<IngestSlot>,
    shutdown: CancellationToken,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
    tasks: TaskTracker,
}

/// Ingest-broadcast-persist relay
pub struct RelayServer {
    state: Arc<RelayState>,
}

impl RelayServer {
    /// Create a new relay with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let registry = Arc::new(SubscriberRegistry::with_config(config.registry.clone()));

        Self {
            state: Arc::new(RelayState {
                config,
                registry,
                ingest_slot: Arc::new(IngestSlot::new()),
                shutdown: CancellationToken::new(),
                next_session_id: AtomicU64::new(1),
                connection_semaphore,
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Get a reference to the subscriber registry
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.state.registry
    }

    /// Whether a producer currently holds the ingest endpoint
    pub fn has_producer(&self) -> bool {
        self.state.ingest_slot.is_taken()
    }

    /// Get the configuration
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Run the server until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Bind the configured address and run until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.state.config.bind_addr)
            .await
            .map_err(|e| {
                Error::Config(format!("cannot bind {}: {}", self.state.config.bind_addr, e))
            })?;

        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// On shutdown the listener stops, live sessions are told to finish
    /// (recordings are closed), and every viewer is disconnected.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.state.config.validate()?;

        let local_addr = listener.local_addr()?;
        tracing::info!(
            addr = %local_addr,
            ingest = %self.state.config.ingest_path,
            viewer = %self.state.config.viewer_path,
            output_dir = %self.state.config.output_dir.display(),
            "Relay listening"
        );

        let tcp_nodelay = self.state.config.tcp_nodelay;
        let listener = listener.tap_io(move |tcp| {
            if tcp_nodelay {
                if let Err(e) = tcp.set_nodelay(true) {
                    tracing::debug!(error = %e, "Failed to configure socket");
                }
            }
        });

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();

        let token = self.state.shutdown.clone();
        let signal = async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
            token.cancel();
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await?;

        self.state.tasks.close();

        if tokio::time::timeout(DRAIN_TIMEOUT, self.state.tasks.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.state.tasks.len(),
                "Connection tasks still running after shutdown"
            );
        }

        self.state.registry.close().await;
        Ok(())
    }

    fn router(&self) -> Router {
        let config = &self.state.config;

        Router::new()
            .route("/", get(status::status_page))
            .route(&config.ingest_path, get(ingest_endpoint))
            .route(&config.viewer_path, get(viewer_endpoint))
            .fallback(not_found)
            .with_state(Arc::clone(&self.state))
    }
}

impl RelayState {
    /// Take a connection slot and a session id for a new WebSocket
    ///
    /// Returns `None` when the connection limit is reached.
    fn admit(&self, peer_addr: SocketAddr) -> Option<(u64, Option<OwnedSemaphorePermit>)> {
        let permit = match self.connection_semaphore {
            Some(ref sem) => match Arc::clone(sem).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return None;
                }
            },
            None => None,
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session_id = session_id, peer = %peer_addr, "New connection");

        Some((session_id, permit))
    }
}

/// Producer endpoint; claims the single ingest slot before upgrading
async fn ingest_endpoint(
    State(state): State<Arc<RelayState>>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some((session_id, permit)) = state.admit(peer_addr) else {
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    let Some(guard) = state.ingest_slot.try_acquire(session_id) else {
        tracing::warn!(
            session_id = session_id,
            active = ?state.ingest_slot.holder(),
            "Producer rejected: another producer is live"
        );
        return (StatusCode::CONFLICT, "another producer is already connected").into_response();
    };

    let max_size = state.config.max_message_size;
    ws.max_message_size(max_size)
        .max_frame_size(max_size)
        .on_failed_upgrade(move |e| {
            tracing::debug!(session_id = session_id, error = %e, "Upgrade failed");
        })
        .on_upgrade(move |socket| {
            let tasks = state.tasks.clone();
            tasks.track_future(async move {
                let _permit = permit;
                let session = IngestSession {
                    session_id,
                    peer_addr,
                    output_dir: &state.config.output_dir,
                    registry: &state.registry,
                    shutdown: &state.shutdown,
                    guard,
                };
                session.run(socket).await;
                tracing::debug!(session_id = session_id, "Connection closed");
            })
        })
}

/// Viewer endpoint
async fn viewer_endpoint(
    State(state): State<Arc<RelayState>>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some((session_id, permit)) = state.admit(peer_addr) else {
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    ws.on_failed_upgrade(move |e| {
        tracing::debug!(session_id = session_id, error = %e, "Upgrade failed");
    })
    .on_upgrade(move |socket| {
        let tasks = state.tasks.clone();
        tasks.track_future(async move {
            let _permit = permit;
            viewer::run_viewer(socket, session_id, peer_addr, &state.registry, &state.shutdown)
                .await;
            tracing::debug!(session_id = session_id, "Connection closed");
        })
    })
}

async fn not_found(uri: Uri) -> (StatusCode, &'static str) {
    tracing::debug!(path = %uri.path(), "Unknown endpoint");
    (StatusCode::NOT_FOUND, "unknown endpoint")
}
