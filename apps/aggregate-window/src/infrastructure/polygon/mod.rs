//! Crypto Aggregate Feed
//!
//! WebSocket client for the crypto aggregate stream. The client only
//! handles the connection: it authenticates, subscribes to one channel and
//! forwards each text frame, unparsed, into the ingest queue.

/// Control messages sent to the feed.
pub mod messages;

/// WebSocket client.
pub mod client;

pub use client::{FeedClient, FeedClientConfig, FeedClientError, FeedState};
pub use messages::{ActionRequest, ConnectionState};
