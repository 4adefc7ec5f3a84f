//! Shared models for box-server wire messages.
//!
//! Contains the tagged-union protocol messages exchanged with the box
//! server, split by direction: [`ClientMessage`] (auth, subscribe,
//! unsubscribe) and [`ServerMessage`] (ack, boxSlice, error). The `type`
//! field is the discriminant on the wire.

pub mod boxes;
pub mod candle;

use serde::{Deserialize, Serialize};

pub use boxes::{BoxEntry, BoxSlicePoint, BoxUpdate};
pub use candle::{Candle, Ohlc};

/// Sentinel `ack` payload confirming a successful authentication.
///
/// Any other ack payload is a generic acknowledgement.
pub const AUTH_SUCCESS_ACK: &str = "auth operation successful";

/// A message sent from the client to the box server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Authentication handshake, sent once per connection.
    Auth { token: String },
    /// Registers interest in box slices for the given instrument keys.
    Subscribe { pairs: Vec<String> },
    /// Drops interest in box slices for the given instrument keys.
    Unsubscribe { pairs: Vec<String> },
}

/// A message pushed from the box server to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Acknowledgement; [`AUTH_SUCCESS_ACK`] marks authentication success.
    #[serde(rename = "ack")]
    Ack { message: String },
    /// A box snapshot delivery for one subscribed instrument.
    #[serde(rename = "boxSlice")]
    BoxSlice { pair: String, data: BoxSliceData },
    /// Server-reported error.
    #[serde(rename = "error")]
    Error { message: String },
    /// Any unrecognized `type` tag; ignored, never fatal.
    #[serde(other)]
    Unknown,
}

/// Payload of a [`ServerMessage::BoxSlice`] delivery.
///
/// `timestamp` and `currentOHLC` are optional on the wire and defaulted
/// during dispatch (see [`BoxUpdate`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxSliceData {
    pub boxes: Vec<BoxEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(
        rename = "currentOHLC",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub current_ohlc: Option<Ohlc>,
}
