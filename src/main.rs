use std::sync::{Arc, Mutex};

use boxflow::BoxflowError;
use boxflow::config::fetch_config;
use boxflow::websocket::{ConnectionCommand, ConnectionManager, StreamingClient};
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), BoxflowError> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt::init();

    let app_config = fetch_config()?;
    let token = app_config
        .server
        .auth_token
        .ok_or(BoxflowError::MissingToken)?;

    let client = Arc::new(Mutex::new(StreamingClient::new()));
    {
        let mut guard = client.lock().expect("client lock");
        guard.set_token(token);
        guard.on_error(Box::new(|e| tracing::error!("stream error: {e}")));
    }

    let writer = Arc::new(tokio::sync::Mutex::new(None));
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

    cmd_tx
        .send(ConnectionCommand::Subscribe {
            pair: "EUR/USD".to_string(),
            handler: Arc::new(|update| {
                info!(
                    pair = %update.pair,
                    boxes = update.boxes.len(),
                    timestamp = %update.timestamp,
                    "Box update"
                );
            }),
        })
        .expect("command channel open");

    let manager = ConnectionManager::new(
        app_config.server.websocket_url,
        Arc::clone(&client),
        writer,
        cmd_rx,
    );
    manager.run().await;

    Ok(())
}
