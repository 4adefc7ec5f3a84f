//! Async streaming client for the box-server WebSocket feed.
//!
//! This module is organized by domain:
//! - [`codec`] - Inbound frame decoding (text or binary payloads)
//! - [`registry`] - Per-instrument subscription table
//! - [`client`] - Transport-free connection/subscription state machine
//! - [`connection`] - Async loop binding the state machine to a socket

pub mod client;
pub mod codec;
pub mod connection;
pub mod registry;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use tungstenite::Message;

use crate::Result;
use crate::models::ClientMessage;

pub use client::{ConnectionState, Reconnect, StreamingClient};
pub use connection::{ConnectionCommand, ConnectionManager};
pub use registry::{SnapshotHandler, SubscriptionRegistry};

/// Write half of a box-server WebSocket connection.
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Read half of a box-server WebSocket connection.
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Establishes a WebSocket connection to the given URL.
///
/// # Errors
///
/// Returns a [`BoxflowError`](crate::BoxflowError) if the connection or
/// TLS handshake fails.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    let (ws_stream, _) = connect_async(url).await?;
    info!("WebSocket handshake completed");

    Ok(ws_stream.split())
}

/// Serializes a [`ClientMessage`] and sends it as a text frame.
///
/// # Errors
///
/// Returns a [`BoxflowError`](crate::BoxflowError) if serialization or
/// the send fails.
pub async fn send_message(write: &mut WsWriter, message: &ClientMessage) -> Result<()> {
    let json = serde_json::to_string(message)?;
    debug!("Sending message: {}", json);
    write.send(Message::Text(json.into())).await?;

    Ok(())
}
