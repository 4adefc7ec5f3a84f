//! WebSocket connection lifecycle management.
//!
//! [`ConnectionManager`] binds a [`StreamingClient`] state machine to a
//! real WebSocket: it connects, drives the authentication handshake,
//! reads and decodes frames, runs the staleness heartbeat, and reconnects
//! with the state machine's backoff schedule after transport loss.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::client::{HEARTBEAT_INTERVAL, Reconnect, StreamingClient};
use super::codec::decode_frame;
use super::registry::SnapshotHandler;
use super::{WsReader, WsWriter, connect, send_message};
use crate::models::ClientMessage;

/// Commands sent from the host to the connection manager.
pub enum ConnectionCommand {
    /// Register interest in an instrument and deliver its box updates to
    /// the handler.
    Subscribe {
        pair: String,
        handler: SnapshotHandler,
    },
    /// Drop interest in an instrument.
    Unsubscribe { pair: String },
}

/// Why the reader loop exited.
enum DisconnectReason {
    /// The connection was lost or errored.
    ConnectionError,
    /// The command channel was closed (host shutting down).
    Shutdown,
}

/// Drives one logical box-server connection.
///
/// Every mutation of the state machine happens under the mutex, so the
/// select arms (frames, commands, heartbeat) never interleave mid-update.
pub struct ConnectionManager {
    url: String,
    client: Arc<Mutex<StreamingClient>>,
    writer: Arc<tokio::sync::Mutex<Option<WsWriter>>>,
    cmd_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
}

impl ConnectionManager {
    /// Creates a new connection manager.
    ///
    /// The shared `client` must already hold the credential token; the
    /// shared `writer` slot lets the host send requests out of band.
    #[must_use]
    pub fn new(
        url: String,
        client: Arc<Mutex<StreamingClient>>,
        writer: Arc<tokio::sync::Mutex<Option<WsWriter>>>,
        cmd_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    ) -> Self {
        Self {
            url,
            client,
            writer,
            cmd_rx,
        }
    }

    /// Runs the connection loop until shutdown, a fatal configuration
    /// error (no token), or retry exhaustion.
    pub async fn run(mut self) {
        loop {
            let begin = self.client.lock().expect("client lock").begin_connect();
            if let Err(e) = begin {
                error!("Cannot connect: {e}");
                return;
            }

            info!(url = %self.url, "Connecting to WebSocket");
            let (mut write, read) = match connect(&self.url).await {
                Ok(pair) => pair,
                Err(e) => {
                    error!("Connection failed: {e}");
                    if self.back_off().await {
                        continue;
                    }
                    return;
                }
            };

            // Transport open: send the auth request and wait for the ack
            // inside the reader loop.
            let auth = self.client.lock().expect("client lock").on_transport_open();
            let sent = match auth {
                Ok(message) => send_message(&mut write, &message).await,
                Err(e) => {
                    error!("Cannot authenticate: {e}");
                    return;
                }
            };
            if let Err(e) = sent {
                warn!("Auth send failed: {e}");
                if self.back_off().await {
                    continue;
                }
                return;
            }

            // Hand the writer to the shared slot
            {
                let mut guard = self.writer.lock().await;
                *guard = Some(write);
            }
            info!("WebSocket connected, authenticating");

            let reason = self.read_loop(read).await;

            // Clear the writer so nobody uses a stale one
            {
                let mut guard = self.writer.lock().await;
                *guard = None;
            }

            match reason {
                DisconnectReason::ConnectionError => {
                    if self.back_off().await {
                        continue;
                    }
                    return;
                }
                DisconnectReason::Shutdown => {
                    self.client.lock().expect("client lock").disconnect();
                    info!("Connection manager shutting down");
                    return;
                }
            }
        }
    }

    /// Applies the backoff schedule after a transport loss. Returns `true`
    /// to retry, `false` when the attempt ceiling is exhausted.
    async fn back_off(&self) -> bool {
        let decision = self
            .client
            .lock()
            .expect("client lock")
            .on_transport_closed();
        match decision {
            Reconnect::After(delay) => {
                tokio::time::sleep(delay).await;
                true
            }
            Reconnect::GiveUp { attempts } => {
                error!(attempts, "Giving up on reconnecting");
                false
            }
        }
    }

    /// Reads frames, host commands, and heartbeat ticks until
    /// disconnection or shutdown.
    async fn read_loop(&mut self, mut read: WsReader) -> DisconnectReason {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it.
        heartbeat.tick().await;

        loop {
            tokio::select! {
                frame = read.next() => {
                    match frame {
                        Some(Ok(message)) => {
                            let Some(decoded) = decode_frame(&message) else {
                                continue;
                            };
                            let out = self
                                .client
                                .lock()
                                .expect("client lock")
                                .on_message(decoded);
                            if !self.send_all(out).await {
                                return DisconnectReason::ConnectionError;
                            }
                        }
                        Some(Err(e)) => {
                            warn!("WebSocket error: {e}");
                            return DisconnectReason::ConnectionError;
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            return DisconnectReason::ConnectionError;
                        }
                    }
                }

                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(ConnectionCommand::Subscribe { pair, handler }) => {
                            let request = self
                                .client
                                .lock()
                                .expect("client lock")
                                .subscribe(pair, handler);
                            if !self.send_all(request.into_iter().collect()).await {
                                return DisconnectReason::ConnectionError;
                            }
                        }
                        Some(ConnectionCommand::Unsubscribe { pair }) => {
                            let request = self
                                .client
                                .lock()
                                .expect("client lock")
                                .unsubscribe(&pair);
                            if !self.send_all(request.into_iter().collect()).await {
                                return DisconnectReason::ConnectionError;
                            }
                        }
                        None => {
                            return DisconnectReason::Shutdown;
                        }
                    }
                }

                _ = heartbeat.tick() => {
                    let out = self
                        .client
                        .lock()
                        .expect("client lock")
                        .heartbeat_tick(Instant::now());
                    if !self.send_all(out).await {
                        return DisconnectReason::ConnectionError;
                    }
                }
            }
        }
    }

    /// Writes requests to the transport in order. Returns `false` if a
    /// send failed and the connection should be torn down.
    async fn send_all(&self, messages: Vec<ClientMessage>) -> bool {
        if messages.is_empty() {
            return true;
        }

        let mut guard = self.writer.lock().await;
        let Some(write) = guard.as_mut() else {
            return true;
        };
        for message in &messages {
            if let Err(e) = send_message(write, message).await {
                warn!("Send failed: {e}");
                return false;
            }
        }

        true
    }
}
