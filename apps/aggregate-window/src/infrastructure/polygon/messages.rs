//! Feed Control Messages
//!
//! The feed accepts a single request shape:
//!
//! ```json
//! {"action":"auth","params":"<api key>"}
//! {"action":"subscribe","params":"XA.BTC-USD"}
//! ```

use serde::{Deserialize, Serialize};

/// Request sent to the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Action name: `auth`, `subscribe`, `unsubscribe`.
    pub action: String,
    /// Action parameter: API key or channel list.
    pub params: String,
}

impl ActionRequest {
    /// Authentication request.
    #[must_use]
    pub fn auth(api_key: &str) -> Self {
        Self {
            action: "auth".to_string(),
            params: api_key.to_string(),
        }
    }

    /// Subscription request for one channel.
    #[must_use]
    pub fn subscribe(channel: &str) -> Self {
        Self {
            action: "subscribe".to_string(),
            params: channel.to_string(),
        }
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Connection state of the feed client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not yet connected.
    #[default]
    Disconnected,
    /// WebSocket handshake in progress.
    Connecting,
    /// Connected and subscribed.
    Connected,
    /// Connection ended.
    Closed,
}

impl ConnectionState {
    /// State name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
        }
    }
}
