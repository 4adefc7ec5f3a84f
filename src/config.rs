//! Application configuration loaded from environment variables.
//!
//! - `BOXFLOW_WEBSOCKET_URL` — overrides the default box-server endpoint
//! - `BOXFLOW_AUTH_TOKEN` — credential token for the streaming handshake
//!
//! The token is optional at load time (history replay needs no
//! connection), but the streaming client refuses to connect without one.

/// Default box-server WebSocket endpoint.
const DEFAULT_WEBSOCKET_URL: &str = "wss://ws.boxflow.dev/v1";

/// Top-level application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
}

/// Box-server connection configuration values.
#[derive(Debug)]
pub struct ServerConfig {
    pub websocket_url: String,
    pub auth_token: Option<String>,
}

/// Loads the application configuration from environment variables.
///
/// The WebSocket URL defaults to `wss://ws.boxflow.dev/v1` and can be
/// overridden with `BOXFLOW_WEBSOCKET_URL`. The auth token is optional;
/// set it via `BOXFLOW_AUTH_TOKEN` when connecting to the live feed.
///
/// # Errors
///
/// Returns [`BoxflowError::Config`](crate::BoxflowError::Config) if
/// `BOXFLOW_WEBSOCKET_URL` is set to something that is not a ws/wss URL.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let websocket_url = non_empty_var("BOXFLOW_WEBSOCKET_URL")
        .unwrap_or_else(|| DEFAULT_WEBSOCKET_URL.to_string());

    if !websocket_url.starts_with("ws://") && !websocket_url.starts_with("wss://") {
        return Err(crate::BoxflowError::Config(format!(
            "BOXFLOW_WEBSOCKET_URL must be a ws:// or wss:// URL, got {websocket_url}"
        )));
    }

    let auth_token = non_empty_var("BOXFLOW_AUTH_TOKEN");

    Ok(AppConfig {
        server: ServerConfig {
            websocket_url,
            auth_token,
        },
    })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}
