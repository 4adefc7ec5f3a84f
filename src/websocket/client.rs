//! Connection/subscription state machine.
//!
//! [`StreamingClient`] owns everything about one logical connection except
//! the socket itself: the [`ConnectionState`], the subscription registry,
//! the pending request queue, the reconnect attempt counter, and the
//! registered error handlers. Every entry point returns the wire messages
//! to be written to the transport, so the whole machine is testable
//! without one. [`ConnectionManager`](super::ConnectionManager) binds it
//! to a real WebSocket.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::BoxflowError;
use crate::models::{AUTH_SUCCESS_ACK, BoxSliceData, BoxUpdate, ClientMessage, ServerMessage};

use super::registry::{SnapshotHandler, SubscriptionRegistry};

/// First reconnect delay; doubles on each consecutive failure.
pub const BASE_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Ceiling on the reconnect delay.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Consecutive transport failures tolerated before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Cadence of the per-instrument staleness check.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Silence on a subscribed instrument beyond this triggers a re-subscribe.
pub const STALENESS_THRESHOLD: Duration = Duration::from_secs(30);

/// Lifecycle phase of the logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Transport is open; the auth request is in flight.
    Unauthenticated,
    Authenticated,
}

/// Outcome of a transport loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconnect {
    /// Retry after this delay.
    After(Duration),
    /// The attempt ceiling was exceeded; stop retrying.
    GiveUp { attempts: u32 },
}

/// Callback invoked with errors surfaced to the consumer.
pub type ErrorHandler = Box<dyn Fn(&BoxflowError) + Send + Sync>;

/// State machine for one logical box-server connection.
pub struct StreamingClient {
    token: Option<String>,
    state: ConnectionState,
    registry: SubscriptionRegistry,
    /// Requests issued while the connection was pending, flushed FIFO
    /// after authentication.
    pending: VecDeque<ClientMessage>,
    attempts: u32,
    error_handlers: Vec<ErrorHandler>,
}

impl Default for StreamingClient {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingClient {
    /// Creates a disconnected client with no credential token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: None,
            state: ConnectionState::Disconnected,
            registry: SubscriptionRegistry::default(),
            pending: VecDeque::new(),
            attempts: 0,
            error_handlers: Vec::new(),
        }
    }

    /// Stores the credential token used by the next authentication.
    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Registers a callback for surfaced errors (auth failure, retry
    /// exhaustion, server-reported errors).
    pub fn on_error(&mut self, handler: ErrorHandler) {
        self.error_handlers.push(handler);
    }

    /// Marks the start of a connection attempt.
    ///
    /// # Errors
    ///
    /// Returns [`BoxflowError::MissingToken`] if no credential token has
    /// been set; the transport must not be opened in that case.
    pub fn begin_connect(&mut self) -> crate::Result<()> {
        if self.token.is_none() {
            return Err(BoxflowError::MissingToken);
        }
        self.state = ConnectionState::Connecting;

        Ok(())
    }

    /// Handles the transport-open event: produces the authentication
    /// request and moves to `Unauthenticated`.
    ///
    /// # Errors
    ///
    /// Returns [`BoxflowError::MissingToken`] if the token was cleared
    /// between `begin_connect` and the transport opening.
    pub fn on_transport_open(&mut self) -> crate::Result<ClientMessage> {
        let token = self.token.clone().ok_or(BoxflowError::MissingToken)?;
        self.state = ConnectionState::Unauthenticated;
        debug!("Transport open, sending auth request");

        Ok(ClientMessage::Auth { token })
    }

    /// Registers interest in an instrument and returns the subscribe
    /// request to send now, if the connection is authenticated.
    ///
    /// The handler and its staleness baseline are always recorded
    /// immediately; when not yet authenticated the request is implicitly
    /// covered by the post-authentication resubscribe-all step.
    pub fn subscribe(
        &mut self,
        key: impl Into<String>,
        handler: SnapshotHandler,
    ) -> Option<ClientMessage> {
        self.subscribe_at(key, handler, Instant::now())
    }

    fn subscribe_at(
        &mut self,
        key: impl Into<String>,
        handler: SnapshotHandler,
        now: Instant,
    ) -> Option<ClientMessage> {
        let key = key.into();
        if self.registry.contains(&key) {
            info!(pair = %key, "Replacing existing subscription handler");
        }
        self.registry.insert(key.clone(), handler, now);
        info!(pair = %key, "Subscription registered");

        match self.state {
            ConnectionState::Authenticated => Some(ClientMessage::Subscribe { pairs: vec![key] }),
            _ => None,
        }
    }

    /// Drops interest in an instrument and returns the unsubscribe request
    /// to send now, if any. Safe to call for a never-subscribed key.
    pub fn unsubscribe(&mut self, key: &str) -> Option<ClientMessage> {
        if !self.registry.remove(key) {
            return None;
        }
        info!(pair = %key, "Subscription removed");

        let request = ClientMessage::Unsubscribe {
            pairs: vec![key.to_string()],
        };
        match self.state {
            ConnectionState::Authenticated => Some(request),
            ConnectionState::Connecting | ConnectionState::Unauthenticated => {
                // The connection is pending; deliver once authenticated so
                // the server drops any state it already holds for the key.
                self.pending.push_back(request);
                None
            }
            ConnectionState::Disconnected => None,
        }
    }

    /// Processes one decoded server message and returns the requests to
    /// send in response.
    pub fn on_message(&mut self, message: ServerMessage) -> Vec<ClientMessage> {
        self.on_message_at(message, Instant::now())
    }

    fn on_message_at(&mut self, message: ServerMessage, now: Instant) -> Vec<ClientMessage> {
        match message {
            ServerMessage::Ack { message } if message == AUTH_SUCCESS_ACK => self.on_auth_success(),
            ServerMessage::Ack { message } => {
                debug!(message = %message, "Acknowledgement");
                Vec::new()
            }
            ServerMessage::BoxSlice { pair, data } => {
                self.dispatch_at(&pair, data, now);
                Vec::new()
            }
            ServerMessage::Error { message } => {
                self.on_server_error(&message);
                Vec::new()
            }
            ServerMessage::Unknown => Vec::new(),
        }
    }

    /// Authentication success: flush the pending queue, then re-issue
    /// subscribe requests for every registered instrument. This handles
    /// first connect and reconnect uniformly.
    fn on_auth_success(&mut self) -> Vec<ClientMessage> {
        self.state = ConnectionState::Authenticated;
        self.attempts = 0;
        info!(subscriptions = self.registry.len(), "Authenticated");

        let mut out: Vec<ClientMessage> = self.pending.drain(..).collect();

        let mut pairs = self.registry.keys();
        if !pairs.is_empty() {
            pairs.sort();
            out.push(ClientMessage::Subscribe { pairs });
        }

        out
    }

    fn on_server_error(&mut self, message: &str) {
        if self.state == ConnectionState::Unauthenticated {
            // The token was rejected. Do not retry with it; the caller
            // must supply a fresh one before connecting again.
            self.token = None;
            warn!(message = %message, "Authentication rejected");
            self.notify_error(&BoxflowError::AuthenticationFailed(message.to_string()));
        } else {
            warn!(message = %message, "Server error");
            self.notify_error(&BoxflowError::Server(message.to_string()));
        }
    }

    /// Delivers a box slice to its registered handler, defaulting missing
    /// optional fields. A delivery for an unregistered instrument (e.g. a
    /// race after unsubscribe) is dropped silently.
    fn dispatch_at(&mut self, pair: &str, data: BoxSliceData, now: Instant) {
        let Some(handler) = self.registry.handler(pair) else {
            debug!(pair = %pair, "Dropping delivery for unsubscribed instrument");
            return;
        };

        let update = BoxUpdate {
            pair: pair.to_string(),
            boxes: data.boxes,
            timestamp: data.timestamp.unwrap_or_default(),
            current_ohlc: data.current_ohlc.unwrap_or_default(),
        };
        handler(update);
        self.registry.record_delivery(pair, now);
    }

    /// Handles transport loss from any state.
    ///
    /// Returns the backoff decision: the k-th consecutive failure yields a
    /// delay of `min(base * 2^(k-1), cap)`; past the attempt ceiling the
    /// client stops retrying and surfaces a terminal error.
    pub fn on_transport_closed(&mut self) -> Reconnect {
        self.state = ConnectionState::Disconnected;

        if self.attempts >= MAX_RECONNECT_ATTEMPTS {
            let attempts = self.attempts;
            warn!(attempts, "Reconnect attempt ceiling exceeded");
            self.notify_error(&BoxflowError::RetriesExhausted { attempts });
            return Reconnect::GiveUp { attempts };
        }

        let delay = BASE_RECONNECT_DELAY
            .saturating_mul(2u32.saturating_pow(self.attempts))
            .min(MAX_RECONNECT_DELAY);
        self.attempts += 1;
        info!(
            attempt = self.attempts,
            delay_secs = delay.as_secs(),
            "Transport lost, backing off"
        );

        Reconnect::After(delay)
    }

    /// Periodic liveness check: returns one re-subscribe request per
    /// instrument whose last delivery is older than the staleness
    /// threshold. Recovers from silent server-side drops without tearing
    /// down the connection.
    #[must_use]
    pub fn heartbeat_tick(&mut self, now: Instant) -> Vec<ClientMessage> {
        if self.state != ConnectionState::Authenticated {
            return Vec::new();
        }

        let mut stale = self.registry.stale_keys(now, STALENESS_THRESHOLD);
        stale.sort();
        for key in &stale {
            warn!(pair = %key, "Subscription stale, re-subscribing");
            self.registry.record_delivery(key, now);
        }

        stale
            .into_iter()
            .map(|key| ClientMessage::Subscribe { pairs: vec![key] })
            .collect()
    }

    /// Tears the client down: clears the registry, the pending queue, all
    /// error handlers, and the attempt counter. Safe to call from any
    /// state; the stored token is kept for a later reconnect.
    pub fn disconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.registry.clear();
        self.pending.clear();
        self.error_handlers.clear();
        self.attempts = 0;
        info!("Client disconnected");
    }

    fn notify_error(&self, error: &BoxflowError) {
        for handler in &self.error_handlers {
            handler(error);
        }
    }
}

impl std::fmt::Debug for StreamingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingClient")
            .field("state", &self.state)
            .field("registry", &self.registry)
            .field("pending", &self.pending.len())
            .field("attempts", &self.attempts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_decimal_macros::dec;

    use crate::models::BoxEntry;

    use super::*;

    fn auth_ack() -> ServerMessage {
        ServerMessage::Ack {
            message: AUTH_SUCCESS_ACK.to_string(),
        }
    }

    fn slice_for(pair: &str) -> ServerMessage {
        ServerMessage::BoxSlice {
            pair: pair.to_string(),
            data: BoxSliceData {
                boxes: vec![BoxEntry {
                    high: dec!(1.1050),
                    low: dec!(1.1049),
                    value: dec!(0.0001),
                }],
                timestamp: None,
                current_ohlc: None,
            },
        }
    }

    fn authenticated_client() -> StreamingClient {
        let mut client = StreamingClient::new();
        client.set_token("tok");
        client.begin_connect().unwrap();
        client.on_transport_open().unwrap();
        client.on_message(auth_ack());
        client
    }

    #[test]
    fn connect_requires_token() {
        let mut client = StreamingClient::new();
        assert!(matches!(
            client.begin_connect(),
            Err(BoxflowError::MissingToken)
        ));
    }

    #[test]
    fn auth_handshake_and_resubscribe_all() {
        let mut client = StreamingClient::new();
        client.set_token("tok");
        // Interest registered before the connection exists.
        assert!(client.subscribe("EUR/USD", Arc::new(|_| {})).is_none());
        assert!(client.subscribe("GBP/USD", Arc::new(|_| {})).is_none());

        client.begin_connect().unwrap();
        assert_eq!(client.state(), ConnectionState::Connecting);

        let auth = client.on_transport_open().unwrap();
        assert_eq!(
            auth,
            ClientMessage::Auth {
                token: "tok".to_string()
            }
        );
        assert_eq!(client.state(), ConnectionState::Unauthenticated);

        let out = client.on_message(auth_ack());
        assert_eq!(client.state(), ConnectionState::Authenticated);
        assert_eq!(
            out,
            vec![ClientMessage::Subscribe {
                pairs: vec!["EUR/USD".to_string(), "GBP/USD".to_string()]
            }]
        );
    }

    #[test]
    fn subscribe_when_authenticated_sends_immediately() {
        let mut client = authenticated_client();
        let request = client.subscribe("EUR/USD", Arc::new(|_| {}));
        assert_eq!(
            request,
            Some(ClientMessage::Subscribe {
                pairs: vec!["EUR/USD".to_string()]
            })
        );
    }

    #[test]
    fn unsubscribe_while_pending_is_flushed_after_auth() {
        let mut client = StreamingClient::new();
        client.set_token("tok");
        client.subscribe("EUR/USD", Arc::new(|_| {}));
        client.begin_connect().unwrap();
        client.on_transport_open().unwrap();

        // Issued while unauthenticated: queued, not sent.
        assert!(client.unsubscribe("EUR/USD").is_none());

        // Flushed before the resubscribe-all step; the registry no longer
        // holds the key so nothing re-subscribes it.
        let out = client.on_message(auth_ack());
        assert_eq!(
            out,
            vec![ClientMessage::Unsubscribe {
                pairs: vec!["EUR/USD".to_string()]
            }]
        );
    }

    #[test]
    fn resubscribe_replaces_the_handler() {
        let mut client = authenticated_client();
        let first = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&first);
        client.subscribe(
            "EUR/USD",
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let second = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&second);
        client.subscribe(
            "EUR/USD",
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        client.on_message(slice_for("EUR/USD"));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_never_subscribed_is_noop() {
        let mut client = authenticated_client();
        assert!(client.unsubscribe("XAU/USD").is_none());
    }

    #[test]
    fn delivery_invokes_handler_and_normalizes() {
        let mut client = authenticated_client();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        client.subscribe(
            "EUR/USD",
            Arc::new(move |update| sink.lock().unwrap().push(update)),
        );

        client.on_message(slice_for("EUR/USD"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].pair, "EUR/USD");
        assert_eq!(seen[0].boxes[0].value, dec!(0.0001));
        // Missing optional fields arrive defaulted.
        assert_eq!(seen[0].timestamp, "");
        assert_eq!(seen[0].current_ohlc, crate::models::Ohlc::default());
    }

    #[test]
    fn delivery_for_unknown_instrument_is_dropped() {
        let mut client = authenticated_client();
        let out = client.on_message(slice_for("GBP/USD"));
        assert!(out.is_empty());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut client = StreamingClient::new();
        client.set_token("tok");

        let mut delays = Vec::new();
        for _ in 0..7 {
            match client.on_transport_closed() {
                Reconnect::After(delay) => delays.push(delay.as_secs()),
                Reconnect::GiveUp { .. } => panic!("gave up too early"),
            }
        }
        // min(1 * 2^(k-1), 30) for k = 1..=7
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn attempt_counter_resets_on_auth_success() {
        let mut client = StreamingClient::new();
        client.set_token("tok");

        client.on_transport_closed();
        client.on_transport_closed();
        client.begin_connect().unwrap();
        client.on_transport_open().unwrap();
        client.on_message(auth_ack());

        // Next failure starts the schedule over.
        assert_eq!(
            client.on_transport_closed(),
            Reconnect::After(BASE_RECONNECT_DELAY)
        );
    }

    #[test]
    fn gives_up_past_the_ceiling() {
        let mut client = StreamingClient::new();
        client.set_token("tok");
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&errors);
        client.on_error(Box::new(move |e| {
            if matches!(e, BoxflowError::RetriesExhausted { .. }) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        for _ in 0..MAX_RECONNECT_ATTEMPTS {
            assert!(matches!(
                client.on_transport_closed(),
                Reconnect::After(_)
            ));
        }
        assert_eq!(
            client.on_transport_closed(),
            Reconnect::GiveUp {
                attempts: MAX_RECONNECT_ATTEMPTS
            }
        );
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn auth_failure_clears_token_and_surfaces_error() {
        let mut client = StreamingClient::new();
        client.set_token("bad");
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&errors);
        client.on_error(Box::new(move |e| {
            if matches!(e, BoxflowError::AuthenticationFailed(_)) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        client.begin_connect().unwrap();
        client.on_transport_open().unwrap();
        client.on_message(ServerMessage::Error {
            message: "invalid token".to_string(),
        });

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        // No auto-retry with the same token.
        assert!(matches!(
            client.begin_connect(),
            Err(BoxflowError::MissingToken)
        ));
    }

    #[test]
    fn heartbeat_resubscribes_only_stale_instruments() {
        let mut client = authenticated_client();
        let start = Instant::now();
        client.subscribe_at("EUR/USD", Arc::new(|_| {}), start);
        client.subscribe_at("GBP/USD", Arc::new(|_| {}), start);

        // Only GBP/USD receives a delivery.
        let later = start + Duration::from_secs(25);
        client.on_message_at(slice_for("GBP/USD"), later);

        let now = start + Duration::from_secs(35);
        let out = client.heartbeat_tick(now);
        assert_eq!(
            out,
            vec![ClientMessage::Subscribe {
                pairs: vec!["EUR/USD".to_string()]
            }]
        );

        // The re-subscribe resets the baseline, so the next tick is quiet.
        assert!(client.heartbeat_tick(now).is_empty());
    }

    #[test]
    fn heartbeat_is_inert_before_authentication() {
        let mut client = StreamingClient::new();
        client.set_token("tok");
        client.subscribe("EUR/USD", Arc::new(|_| {}));

        let now = Instant::now() + Duration::from_secs(120);
        assert!(client.heartbeat_tick(now).is_empty());
    }

    #[test]
    fn disconnect_clears_everything_from_any_state() {
        let mut client = authenticated_client();
        client.subscribe("EUR/USD", Arc::new(|_| {}));
        client.on_error(Box::new(|_| {}));

        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.heartbeat_tick(Instant::now()).is_empty());

        // Repeated teardown is safe.
        client.disconnect();

        // The token survives teardown; reconnect restarts the schedule.
        client.begin_connect().unwrap();
        assert_eq!(client.state(), ConnectionState::Connecting);
    }
}
