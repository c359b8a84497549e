//! Live-update bridge: one push connection per resource stream.
//!
//! The bridge connects to `{base}/ws/{resource}/`, authenticating with
//! the current access token passed as the connection's subprotocol, and
//! merges inbound partial records into the cache in arrival order. After
//! every merge it invalidates the stream's tag so a reconciling refetch
//! pulls whatever fields the push payload omitted.
//!
//! Connection lifecycle: `Disconnected → Connecting → Connected`, back
//! to `Disconnected` on close or error. Lost connections reconnect with
//! bounded exponential backoff; `shutdown` closes the socket and ends
//! the loop with no dangling connection.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use crate::cache::QueryCache;
use crate::config::ShopfloorConfig;
use crate::errors::BridgeError;
use crate::models::{ItemDelta, OrderDelta, RecordDelta, Tag};
use crate::storage::CredentialStore;

/// Smallest delay before a reconnect attempt.
const BACKOFF_FLOOR: Duration = Duration::from_secs(1);
/// Largest delay between reconnect attempts.
const BACKOFF_CEILING: Duration = Duration::from_secs(30);

/// Resource streams the backend pushes changes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamResource {
    Orders,
    Items,
}

impl StreamResource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Orders => "orders",
            Self::Items => "items",
        }
    }

    /// The invalidation tag whose entries this stream feeds.
    pub fn tag(&self) -> Tag {
        match self {
            Self::Orders => Tag::Orders,
            Self::Items => Tag::Items,
        }
    }

    /// Validate an inbound payload into a typed delta at the boundary.
    pub fn parse_delta(&self, payload: &str) -> Result<RecordDelta, BridgeError> {
        match self {
            Self::Orders => serde_json::from_str::<OrderDelta>(payload)
                .map(RecordDelta::Order)
                .map_err(BridgeError::Payload),
            Self::Items => serde_json::from_str::<ItemDelta>(payload)
                .map(RecordDelta::Item)
                .map_err(BridgeError::Payload),
        }
    }
}

impl std::str::FromStr for StreamResource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orders" => Ok(Self::Orders),
            "items" => Ok(Self::Items),
            _ => Err(format!("Invalid stream resource: {}", s)),
        }
    }
}

/// Connection state, observable through [`LiveBridge::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Disconnected,
    Connecting,
    Connected,
}

pub struct LiveBridge {
    resource: StreamResource,
    url: String,
    cache: Arc<QueryCache>,
    store: Arc<CredentialStore>,
    state_tx: watch::Sender<BridgeState>,
    shutdown_tx: watch::Sender<bool>,
}

impl LiveBridge {
    pub fn new(
        config: &ShopfloorConfig,
        resource: StreamResource,
        cache: Arc<QueryCache>,
        store: Arc<CredentialStore>,
    ) -> Self {
        let (state_tx, _) = watch::channel(BridgeState::Disconnected);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            resource,
            url: config.ws_url(resource.as_str()),
            cache,
            store,
            state_tx,
            shutdown_tx,
        }
    }

    pub fn state(&self) -> watch::Receiver<BridgeState> {
        self.state_tx.subscribe()
    }

    /// Ask the run loop to close the socket and return.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Drive the connection until [`shutdown`](Self::shutdown).
    ///
    /// Returns early only when no credential is available at all; every
    /// other failure is retried with backoff.
    pub async fn run(&self) -> Result<(), BridgeError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut attempt: u32 = 0;

        loop {
            if *shutdown_rx.borrow() {
                self.state_tx.send_replace(BridgeState::Disconnected);
                return Ok(());
            }

            self.state_tx.send_replace(BridgeState::Connecting);
            match self.connect().await {
                Ok(stream) => {
                    info!(resource = self.resource.as_str(), "push channel connected");
                    self.state_tx.send_replace(BridgeState::Connected);
                    attempt = 0;
                    self.pump(stream, &mut shutdown_rx).await;
                    self.state_tx.send_replace(BridgeState::Disconnected);
                }
                Err(BridgeError::MissingCredential) => {
                    self.state_tx.send_replace(BridgeState::Disconnected);
                    return Err(BridgeError::MissingCredential);
                }
                Err(err) => {
                    warn!(resource = self.resource.as_str(), error = %err, "push connection failed");
                    self.state_tx.send_replace(BridgeState::Disconnected);
                }
            }

            let delay = backoff_delay(attempt);
            attempt = attempt.saturating_add(1);
            debug!(resource = self.resource.as_str(), ?delay, "reconnecting after backoff");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => {}
            }
        }
    }

    async fn connect(
        &self,
    ) -> Result<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        BridgeError,
    > {
        let pair = self
            .store
            .token_pair()
            .ok_or(BridgeError::MissingCredential)?;
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(BridgeError::from)?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_str(&pair.access)
                .unwrap_or_else(|_| HeaderValue::from_static("")),
        );
        let (stream, _) = tokio_tungstenite::connect_async(request).await?;
        Ok(stream)
    }

    /// Read messages until the socket closes or shutdown is requested.
    /// Merges apply strictly in arrival order; the single reader is the
    /// ordering guarantee.
    async fn pump(
        &self,
        mut stream: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                message = stream.next() => {
                    match message {
                        Some(Ok(Message::Text(payload))) => {
                            self.handle_payload(payload.as_str());
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            if stream.send(Message::Pong(payload)).await.is_err() {
                                return;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => return,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!(error = %err, "push channel read failed");
                            return;
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        let _ = stream.send(Message::Close(None)).await;
                        return;
                    }
                }
            }
        }
    }

    fn handle_payload(&self, payload: &str) {
        let tag = self.resource.tag();
        match self.resource.parse_delta(payload) {
            Ok(delta) => {
                let merged = self.cache.merge_record(tag, &delta);
                debug!(
                    resource = self.resource.as_str(),
                    merged, "push delta merged, scheduling refetch"
                );
                // The payload may omit fields; reconcile from the server
                // even when no cached row matched.
                self.cache.invalidate(&[tag]);
            }
            Err(err) => {
                warn!(error = %err, "discarding unparseable push payload");
            }
        }
    }
}

/// Exponential backoff, clamped to [`BACKOFF_CEILING`].
fn backoff_delay(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(16));
    BACKOFF_FLOOR.saturating_mul(factor).min(BACKOFF_CEILING)
}
