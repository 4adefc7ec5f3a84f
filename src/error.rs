//! Crate-level error types.
//!
//! [`BoxflowError`] unifies every error source (configuration, WebSocket,
//! JSON, protocol, engine input) behind a single enum so callers can match
//! on the variant they care about while still using the `?` operator for
//! easy propagation.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BoxflowError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum BoxflowError {
    /// A configuration value was missing, inconsistent, or unreadable.
    #[error("configuration error: {0}")]
    Config(String),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error reported by the box server on an established connection.
    #[error("server error: {0}")]
    Server(String),

    /// The server rejected the authentication request.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// `connect` was requested without a credential token set.
    #[error("no auth token set; call set_token before connecting")]
    MissingToken,

    /// The reconnect attempt ceiling was exceeded.
    #[error("gave up reconnecting after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// A candle history violated an input precondition (e.g. ordering).
    #[error("invalid candle history: {0}")]
    History(String),

    /// An instrument configuration failed validation.
    #[error("invalid instrument config: {0}")]
    InvalidInstrument(String),
}
