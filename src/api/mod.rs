//! REST API and WebSocket server for the sensor hub
//!
//! This module provides HTTP endpoints for the live graph, alerts, recording
//! sessions and recorded messages, plus a WebSocket stream of hub events.
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Actor handles** for recording and querying storage
//! - **Engines** (aggregator, alerts) read directly through their locks
//! - **WebSocket** subscribers fed by the notification dispatcher
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check
//! - `GET /api/v1/stats` - Pipeline statistics
//! - `GET /api/v1/graph` - Current graph snapshot
//! - `PUT /api/v1/project` - Replace the active project
//! - `GET /api/v1/alerts/active` - Active alerts
//! - `GET /api/v1/alerts/history` - Resolved alerts
//! - `DELETE /api/v1/alerts/resolved` - Drop old resolved alerts
//! - `GET /api/v1/alerts/stats` - Alert counters
//! - `POST /api/v1/sessions/start` / `POST /api/v1/sessions/stop` - Recording
//! - `GET /api/v1/projects/:id/messages` - Recorded messages
//! - `GET /api/v1/projects/:id/equipment/:equipment_id/messages`
//! - `GET /api/v1/projects/:id/sessions` - Recording sessions
//! - `POST /api/v1/discovery/start` / `POST /api/v1/discovery/stop` - Broker discovery
//! - `GET /api/v1/discovery` - Discovery status and discovered nodes
//! - `GET /api/v1/discovery/layout` - Layout suggested by discovery
//! - `DELETE /api/v1/discovery/nodes` - Forget discovered nodes
//! - `WS /api/v1/stream` - Real-time hub events

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod middleware;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;
#[cfg(feature = "api")]
pub mod types;
#[cfg(feature = "api")]
pub mod websocket;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;

use std::net::{Ipv4Addr, SocketAddr};

#[cfg(feature = "api")]
use axum::{
    Router,
    routing::{delete, get, post, put},
};
use serde::Deserialize;
#[cfg(feature = "api")]
use tracing::info;

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Optional bearer token required on every request
    pub auth_token: Option<String>,

    /// Enable CORS for dashboard
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            auth_token: None,
            enable_cors: true,
        }
    }
}

/// Build the router with all routes and layers
#[cfg(feature = "api")]
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let mut app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/stats", get(routes::stats::get_stats))
        .route("/api/v1/graph", get(routes::graph::get_graph))
        .route("/api/v1/project", put(routes::graph::put_project))
        .route("/api/v1/alerts/active", get(routes::alerts::active_alerts))
        .route("/api/v1/alerts/history", get(routes::alerts::alert_history))
        .route(
            "/api/v1/alerts/resolved",
            delete(routes::alerts::clear_resolved),
        )
        .route("/api/v1/alerts/stats", get(routes::alerts::alert_stats))
        .route(
            "/api/v1/sessions/start",
            post(routes::sessions::start_session),
        )
        .route("/api/v1/sessions/stop", post(routes::sessions::stop_session))
        .route(
            "/api/v1/projects/:id/messages",
            get(routes::messages::project_messages),
        )
        .route(
            "/api/v1/projects/:id/equipment/:equipment_id/messages",
            get(routes::messages::equipment_messages),
        )
        .route(
            "/api/v1/projects/:id/sessions",
            get(routes::sessions::list_sessions),
        )
        .route("/api/v1/discovery", get(routes::discovery::discovery_status))
        .route(
            "/api/v1/discovery/start",
            post(routes::discovery::start_discovery),
        )
        .route(
            "/api/v1/discovery/stop",
            post(routes::discovery::stop_discovery),
        )
        .route(
            "/api/v1/discovery/layout",
            get(routes::discovery::suggested_layout),
        )
        .route(
            "/api/v1/discovery/nodes",
            delete(routes::discovery::clear_discovered),
        )
        .route("/api/v1/stream", get(websocket::websocket_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    if let Some(token) = config.auth_token.clone() {
        app = app.layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        ));
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
