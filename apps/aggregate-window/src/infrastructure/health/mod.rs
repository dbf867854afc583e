//! Status Endpoint
//!
//! Small HTTP server exposing feed and window state plus the Prometheus
//! scrape output. Only started when a port is configured.
//!
//! | Route | Response |
//! |-------|----------|
//! | `GET /health` | JSON [`StatusReport`] |
//! | `GET /healthz` | `OK` while the process runs |
//! | `GET /readyz` | `READY` once subscribed, 503 otherwise |
//! | `GET /metrics` | Prometheus text exposition |

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::domain::window::SharedWindow;
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::polygon::{ConnectionState, FeedState};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

// =============================================================================
// Report
// =============================================================================

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Overall status.
    pub status: HealthStatus,
    /// Crate version.
    pub version: String,
    /// Seconds since the endpoint state was created.
    pub uptime_secs: u64,
    /// Time the report was built.
    pub generated_at: DateTime<Utc>,
    /// Feed connection.
    pub feed: FeedReport,
    /// Window contents.
    pub window: WindowReport,
}

/// Coarse status derived from the feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Subscribed and frames are arriving.
    Healthy,
    /// Connecting, or subscribed with no frames yet.
    Degraded,
    /// Feed connection has ended.
    Unhealthy,
}

impl HealthStatus {
    /// Classify a feed snapshot.
    #[must_use]
    pub const fn of(feed: &FeedReport) -> Self {
        match feed.state {
            ConnectionState::Closed => Self::Unhealthy,
            ConnectionState::Connected if feed.frames_received > 0 => Self::Healthy,
            _ => Self::Degraded,
        }
    }

    const fn http_status(self) -> StatusCode {
        match self {
            Self::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
            Self::Healthy | Self::Degraded => StatusCode::OK,
        }
    }
}

/// Feed part of the report.
#[derive(Debug, Clone, Serialize)]
pub struct FeedReport {
    /// Connection state.
    pub state: ConnectionState,
    /// Text frames forwarded to the queue.
    pub frames_received: u64,
    /// When the subscription was established.
    pub connected_at: Option<DateTime<Utc>>,
    /// Why the connection ended, if it failed.
    pub error: Option<String>,
}

/// Window part of the report.
#[derive(Debug, Clone, Serialize)]
pub struct WindowReport {
    /// Bars held.
    pub size: usize,
    /// Current order flag.
    pub order_preserved: bool,
}

// =============================================================================
// Server
// =============================================================================

/// Handles shared with the route handlers.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    feed: Arc<FeedState>,
    window: SharedWindow,
}

impl HealthServerState {
    /// Bundle the feed and window handles.
    #[must_use]
    pub fn new(version: String, feed: Arc<FeedState>, window: SharedWindow) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            feed,
            window,
        }
    }

    /// Build a report from the current state.
    #[must_use]
    pub fn report(&self) -> StatusReport {
        let feed = FeedReport {
            state: self.feed.get_state(),
            frames_received: self.feed.get_frames_received(),
            connected_at: self.feed.connected_at(),
            error: self.feed.error_message(),
        };

        let window = {
            let guard = self.window.read();
            WindowReport {
                size: guard.len(),
                order_preserved: guard.is_order_preserved(),
            }
        };

        StatusReport {
            status: HealthStatus::of(&feed),
            version: self.version.clone(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            generated_at: Utc::now(),
            feed,
            window,
        }
    }
}

/// Status endpoint server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    shutdown: CancellationToken,
}

impl HealthServer {
    /// Create a server bound to `port` on all interfaces.
    #[must_use]
    pub const fn new(
        port: u16,
        state: Arc<HealthServerState>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            port,
            state,
            shutdown,
        }
    }

    /// Routes, without a listener.
    pub fn router(state: Arc<HealthServerState>) -> Router {
        Router::new()
            .route("/health", get(status))
            .route("/healthz", get(live))
            .route("/readyz", get(ready))
            .route("/metrics", get(prometheus))
            .with_state(state)
    }

    /// Serve until the shutdown token fires.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if the port cannot be bound or serving
    /// fails.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let port = self.port;
        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port)))
            .await
            .map_err(|source| HealthServerError::Bind { port, source })?;

        tracing::info!(port, "Status endpoint listening");

        axum::serve(listener, Self::router(self.state))
            .with_graceful_shutdown(self.shutdown.cancelled_owned())
            .await
            .map_err(HealthServerError::Serve)?;

        tracing::debug!("Status endpoint stopped");
        Ok(())
    }
}

/// Status endpoint errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Port could not be bound.
    #[error("cannot bind status endpoint to port {port}: {source}")]
    Bind {
        /// Requested port.
        port: u16,
        /// Underlying error.
        source: io::Error,
    },

    /// Serving failed.
    #[error("status endpoint failed: {0}")]
    Serve(io::Error),
}

// =============================================================================
// Handlers
// =============================================================================

async fn status(State(state): State<Arc<HealthServerState>>) -> Response {
    let report = state.report();
    (report.status.http_status(), axum::Json(report)).into_response()
}

async fn live() -> &'static str {
    "OK"
}

async fn ready(State(state): State<Arc<HealthServerState>>) -> Response {
    match state.feed.get_state() {
        ConnectionState::Connected => (StatusCode::OK, "READY").into_response(),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "NOT READY").into_response(),
    }
}

async fn prometheus() -> Response {
    let Some(handle) = get_metrics_handle() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response();
    };
    ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], handle.render()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::window::WindowAggregator;
    use test_case::test_case;

    fn feed(state: ConnectionState, frames_received: u64) -> FeedReport {
        FeedReport {
            state,
            frames_received,
            connected_at: None,
            error: None,
        }
    }

    #[test_case(ConnectionState::Disconnected, 0 => HealthStatus::Degraded ; "not started")]
    #[test_case(ConnectionState::Connecting, 0 => HealthStatus::Degraded ; "handshake")]
    #[test_case(ConnectionState::Connected, 0 => HealthStatus::Degraded ; "subscribed, quiet")]
    #[test_case(ConnectionState::Connected, 12 => HealthStatus::Healthy ; "streaming")]
    #[test_case(ConnectionState::Closed, 12 => HealthStatus::Unhealthy ; "closed")]
    fn classifies_feed(state: ConnectionState, frames: u64) -> HealthStatus {
        HealthStatus::of(&feed(state, frames))
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&HealthStatus::Unhealthy).unwrap();
        assert_eq!(json, "\"unhealthy\"");
    }

    #[test]
    fn report_reflects_window_and_feed() {
        let feed_state = Arc::new(FeedState::new());
        let window = WindowAggregator::default().into_shared();
        let state = HealthServerState::new("0.1.0".to_string(), Arc::clone(&feed_state), window);

        let report = state.report();
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.window.size, 0);
        assert!(report.window.order_preserved);

        feed_state.set_error("connection closed".to_string());
        let report = state.report();
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.feed.error.as_deref(), Some("connection closed"));
        assert_eq!(report.status.http_status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
