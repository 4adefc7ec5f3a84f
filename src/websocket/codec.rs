//! Inbound frame decoding.

use tracing::{debug, warn};
use tungstenite::Message;

use crate::models::ServerMessage;

/// Decodes a transport frame into a [`ServerMessage`].
///
/// The transport's reported payload type selects the decoder: text frames
/// are parsed as JSON text, binary frames as JSON bytes. Control frames
/// (ping/pong/close) yield `None`, as do malformed payloads, which are
/// logged and dropped per-frame rather than tearing down the connection.
#[must_use]
pub fn decode_frame(frame: &Message) -> Option<ServerMessage> {
    let decoded = match frame {
        Message::Text(text) => serde_json::from_str::<ServerMessage>(text),
        Message::Binary(bytes) => serde_json::from_slice::<ServerMessage>(bytes),
        _ => return None,
    };

    match decoded {
        Ok(ServerMessage::Unknown) => {
            debug!("Ignoring message with unknown type tag");
            Some(ServerMessage::Unknown)
        }
        Ok(message) => Some(message),
        Err(e) => {
            warn!("Dropping undecodable frame: {e}");
            None
        }
    }
}
