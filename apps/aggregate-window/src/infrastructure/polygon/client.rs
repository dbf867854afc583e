//! Feed WebSocket Client
//!
//! Connects to the crypto aggregate stream, authenticates, subscribes and
//! forwards text frames into the ingest queue.
//!
//! # Protocol
//!
//! 1. Connect to the WebSocket endpoint
//! 2. Send `{"action":"auth","params":"<key>"}`
//! 3. Send `{"action":"subscribe","params":"XA.<ticker>"}`
//! 4. Receive JSON arrays of status messages and aggregates
//!
//! The reader does no parsing; a slow reader risks the server dropping the
//! connection. Any connection failure ends `run` with an error. There is no
//! reconnection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::messages::{ActionRequest, ConnectionState};
use crate::infrastructure::config::FeedSettings;
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end the feed client.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Control message could not be serialized.
    #[error("failed to serialize {action} request: {source}")]
    Serialize {
        /// Action being sent.
        action: &'static str,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// Ingest queue is gone.
    #[error("ingest queue closed")]
    QueueClosed,

    /// Server closed the connection or the stream ended.
    #[error("connection closed")]
    ConnectionClosed,
}

// =============================================================================
// Feed State
// =============================================================================

/// Connection status shared with the health endpoint.
#[derive(Debug, Default)]
pub struct FeedState {
    state: parking_lot::RwLock<ConnectionState>,
    connected_at: parking_lot::RwLock<Option<DateTime<Utc>>>,
    error_message: parking_lot::RwLock<Option<String>>,
    frames_received: AtomicU64,
}

impl FeedState {
    /// Create a disconnected state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection state.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        if state == ConnectionState::Connected {
            *self.connected_at.write() = Some(Utc::now());
            *self.error_message.write() = None;
        }
    }

    /// Mark the connection closed with an error.
    pub fn set_error(&self, message: String) {
        *self.state.write() = ConnectionState::Closed;
        *self.error_message.write() = Some(message);
    }

    /// Count a received frame.
    pub fn increment_frames(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Current connection state.
    #[must_use]
    pub fn get_state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// When the connection was last established.
    #[must_use]
    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        *self.connected_at.read()
    }

    /// Last error message, if the connection failed.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.error_message.read().clone()
    }

    /// Frames received so far.
    #[must_use]
    pub fn get_frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Feed Client Configuration
// =============================================================================

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// WebSocket URL.
    pub url: String,
    /// API key for the auth message.
    pub api_key: String,
    /// Channel to subscribe to.
    pub channel: String,
}

impl From<&FeedSettings> for FeedClientConfig {
    fn from(settings: &FeedSettings) -> Self {
        Self {
            url: settings.url.clone(),
            api_key: settings.api_key.expose().to_string(),
            channel: settings.channel(),
        }
    }
}

// =============================================================================
// Feed Client
// =============================================================================

/// WebSocket reader for the aggregate feed.
pub struct FeedClient {
    config: FeedClientConfig,
    frames_tx: mpsc::Sender<String>,
    state: Arc<FeedState>,
    cancel: CancellationToken,
}

impl FeedClient {
    /// Create a new feed client.
    #[must_use]
    pub const fn new(
        config: FeedClientConfig,
        frames_tx: mpsc::Sender<String>,
        state: Arc<FeedState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            frames_tx,
            state,
            cancel,
        }
    }

    /// Connect and forward frames until cancelled or the connection fails.
    ///
    /// Consumes the client so the queue sender is dropped on return, which
    /// lets the ingest consumer drain and stop.
    ///
    /// # Errors
    ///
    /// Returns `FeedClientError` on any connection failure.
    pub async fn run(self) -> Result<(), FeedClientError> {
        let result = self.connect_and_run().await;

        match &result {
            Ok(()) => self.state.set_state(ConnectionState::Closed),
            Err(e) => self.state.set_error(e.to_string()),
        }

        result
    }

    async fn connect_and_run(&self) -> Result<(), FeedClientError> {
        tracing::info!(url = %self.config.url, "Connecting to aggregate feed");
        self.state.set_state(ConnectionState::Connecting);

        let (ws_stream, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            connected = tokio_tungstenite::connect_async(&self.config.url) => connected?,
        };

        let (mut write, mut read) = ws_stream.split();

        let auth = ActionRequest::auth(&self.config.api_key)
            .to_json()
            .map_err(|source| FeedClientError::Serialize {
                action: "auth",
                source,
            })?;
        write.send(Message::Text(auth.into())).await?;

        let subscribe = ActionRequest::subscribe(&self.config.channel)
            .to_json()
            .map_err(|source| FeedClientError::Serialize {
                action: "subscribe",
                source,
            })?;
        write.send(Message::Text(subscribe.into())).await?;

        self.state.set_state(ConnectionState::Connected);
        tracing::info!(channel = %self.config.channel, "Subscribed to aggregate feed");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("Feed client cancelled");
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.state.increment_frames();
                            metrics::record_frame_received();
                            self.frames_tx
                                .send(text.as_str().to_owned())
                                .await
                                .map_err(|_| FeedClientError::QueueClosed)?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(frame = ?frame, "Server sent close frame");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            // Binary, pong and raw frames carry no aggregates.
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::ApiKey;

    #[test]
    fn config_from_settings() {
        let settings = FeedSettings {
            url: "wss://example.test/crypto".to_string(),
            ticker: "ETH-USD".to_string(),
            channel_prefix: "XA.".to_string(),
            api_key: ApiKey::new("k".to_string()),
        };

        let config = FeedClientConfig::from(&settings);
        assert_eq!(config.url, "wss://example.test/crypto");
        assert_eq!(config.channel, "XA.ETH-USD");
        assert_eq!(config.api_key, "k");
    }

    #[test]
    fn feed_state_transitions() {
        let state = FeedState::new();
        assert_eq!(state.get_state(), ConnectionState::Disconnected);
        assert!(state.connected_at().is_none());

        state.set_state(ConnectionState::Connected);
        assert!(state.connected_at().is_some());

        state.increment_frames();
        state.increment_frames();
        assert_eq!(state.get_frames_received(), 2);

        state.set_error("connection closed".to_string());
        assert_eq!(state.get_state(), ConnectionState::Closed);
        assert_eq!(state.error_message().as_deref(), Some("connection closed"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_fatal() {
        let (tx, _rx) = mpsc::channel(1);
        let state = Arc::new(FeedState::new());
        let client = FeedClient::new(
            FeedClientConfig {
                url: "ws://127.0.0.1:1".to_string(),
                api_key: "k".to_string(),
                channel: "XA.BTC-USD".to_string(),
            },
            tx,
            Arc::clone(&state),
            CancellationToken::new(),
        );

        assert!(client.run().await.is_err());
        assert_eq!(state.get_state(), ConnectionState::Closed);
        assert!(state.error_message().is_some());
    }
}
