//! `TaskhubServer`: Axum HTTP surface and WebSocket upgrade entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use serde::Deserialize;
use taskhub_core::GroupId;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::auth::{AuthError, IdentityResolver};
use crate::config::{ServerConfig, SessionConfig};
use crate::health::{self, HealthResponse};
use crate::hub::{Hub, Notifier};
use crate::membership::{MembershipError, MembershipProvider};
use crate::metrics::WS_UPGRADE_REJECTIONS_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::run_session;

/// Server start-up failures.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying socket error.
        source: std::io::Error,
    },
}

/// Why an upgrade request was refused.
#[derive(Debug, Error)]
pub enum UpgradeError {
    /// No token in the query string or `Authorization` header.
    #[error("Authentication required")]
    Unauthenticated,
    /// The token did not verify.
    #[error("Invalid token")]
    InvalidToken,
    /// Group memberships could not be loaded.
    #[error("Failed to load memberships")]
    Membership,
    /// The request was not a valid WebSocket upgrade.
    #[error(transparent)]
    Upgrade(#[from] WebSocketUpgradeRejection),
}

impl UpgradeError {
    fn reason(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "missing_token",
            Self::InvalidToken => "invalid_token",
            Self::Membership => "membership",
            Self::Upgrade(_) => "not_upgrade",
        }
    }
}

impl IntoResponse for UpgradeError {
    fn into_response(self) -> Response {
        counter!(WS_UPGRADE_REJECTIONS_TOTAL, "reason" => self.reason()).increment(1);
        match self {
            Self::Unauthenticated | Self::InvalidToken => {
                (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
            }
            Self::Membership => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response(),
            Self::Upgrade(rejection) => rejection.into_response(),
        }
    }
}

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Hub handle for new sessions.
    pub hub: Hub,
    /// Token verification.
    pub identity: Arc<dyn IdentityResolver>,
    /// Initial group lookup.
    pub memberships: Arc<dyn MembershipProvider>,
    /// Per-connection limits.
    pub session: SessionConfig,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The taskhub real-time server.
pub struct TaskhubServer {
    config: ServerConfig,
    hub: Hub,
    hub_task: Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<ShutdownCoordinator>,
    identity: Arc<dyn IdentityResolver>,
    memberships: Arc<dyn MembershipProvider>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl TaskhubServer {
    /// Create a server and start its hub. Must be called inside a Tokio runtime.
    pub fn new(
        config: ServerConfig,
        identity: Arc<dyn IdentityResolver>,
        memberships: Arc<dyn MembershipProvider>,
    ) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let (hub, hub_task) = Hub::spawn(shutdown.token());
        Self {
            config,
            hub,
            hub_task: Mutex::new(Some(hub_task)),
            shutdown,
            identity,
            memberships,
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
            hub: self.hub.clone(),
            identity: Arc::clone(&self.identity),
            memberships: Arc::clone(&self.memberships),
            session: self.config.session.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/websocket", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address and the server task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let bind_error = |source: std::io::Error| ServerError::Bind {
            addr: addr.clone(),
            source,
        };
        let listener = TcpListener::bind(&addr).await.map_err(bind_error)?;
        let local = listener.local_addr().map_err(bind_error)?;

        let app = self.router();
        let token = self.shutdown.token();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "http server failed");
            }
        });
        info!(%local, "taskhub listening");
        Ok((local, task))
    }

    /// Hub handle.
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Typed event publisher bound to this server's hub.
    pub fn notifier(&self) -> Notifier {
        Notifier::new(self.hub.clone())
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Take the router task handle, for awaiting during shutdown.
    pub fn take_hub_task(&self) -> Option<JoinHandle<()>> {
        self.hub_task.lock().take()
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Query parameter first, then `Authorization: Bearer`.
fn extract_token(query: Option<String>, headers: &HeaderMap) -> Option<String> {
    query.filter(|t| !t.is_empty()).or_else(|| {
        headers
            .get(header::AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
    })
}

/// GET /ws, /websocket
async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, UpgradeError> {
    let token = extract_token(query.token, &headers).ok_or(UpgradeError::Unauthenticated)?;

    let identity = state.identity.resolve(&token).await.map_err(|e| {
        match &e {
            AuthError::Expired => debug!("rejected expired token"),
            other => warn!(error = %other, "rejected token"),
        }
        UpgradeError::InvalidToken
    })?;
    if identity.user_id.is_empty() {
        return Err(UpgradeError::InvalidToken);
    }

    let groups: Vec<GroupId> = match state.memberships.groups_for(&identity.user_id).await {
        Ok(groups) => groups,
        Err(MembershipError::NotFound) => Vec::new(),
        Err(e) => {
            error!(user_id = %identity.user_id, error = %e, "membership lookup failed");
            return Err(UpgradeError::Membership);
        }
    };

    let ws = ws?;
    let session = state.session.clone();
    let hub = state.hub.clone();
    let user_id = identity.user_id;
    Ok(ws
        .max_message_size(session.max_message_size)
        .max_frame_size(session.max_message_size)
        .on_upgrade(move |socket| async move {
            let _ = run_session(socket, hub, user_id, groups, session).await;
        }))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.hub.stats().await;
    Json(health::health_check(state.start_time, &stats))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
