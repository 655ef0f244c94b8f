//! The relay endpoint and the event source it feeds.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use community::{ChatEvent, EventSource};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Header carrying the shared relay secret.
pub const SECRET_HEADER: &str = "x-relay-secret";

pub const EVENTS_PATH: &str = "/events";

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("the relay secret must not be empty")]
    EmptySecret,
}

#[derive(Clone)]
struct RelayState {
    secret: Arc<str>,
    sender: mpsc::Sender<ChatEvent>,
}

/// Routes for the relay protocol. Accepted events are pushed into `sender`.
pub fn relay_router(secret: impl Into<String>, sender: mpsc::Sender<ChatEvent>) -> Router {
    let state = RelayState {
        secret: Arc::from(secret.into()),
        sender,
    };
    Router::new()
        .route(EVENTS_PATH, post(receive))
        .route("/health", get(|| async { StatusCode::OK }))
        .with_state(state)
}

async fn receive(State(state): State<RelayState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let presented = headers
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !secrets_match(presented, &state.secret) {
        warn!("relay request rejected: bad secret");
        return StatusCode::UNAUTHORIZED;
    }

    let event: ChatEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "malformed relay event");
            return StatusCode::BAD_REQUEST;
        }
    };
    debug!(?event, "relay event received");

    match state.sender.send(event).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Compares without short-circuiting on the first differing byte.
fn secrets_match(presented: &str, expected: &str) -> bool {
    !expected.is_empty()
        && presented.len() == expected.len()
        && presented
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// Chat events received over HTTP from a gateway relay.
pub struct RelayEventSource {
    receiver: mpsc::Receiver<ChatEvent>,
    server: Option<JoinHandle<()>>,
}

impl RelayEventSource {
    /// Creates an unbound source and the router that feeds it.
    pub fn new(secret: impl Into<String>, capacity: usize) -> (Router, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let source = Self {
            receiver,
            server: None,
        };
        (relay_router(secret, sender), source)
    }

    /// Binds `addr` and serves the relay endpoint in the background until the
    /// source is dropped.
    pub async fn bind(
        addr: SocketAddr,
        secret: impl Into<String>,
        capacity: usize,
    ) -> Result<Self, ListenerError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(ListenerError::EmptySecret);
        }
        let (router, mut source) = Self::new(secret, capacity);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;
        info!(address = %addr, "relay endpoint listening");

        source.server = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = %e, "relay endpoint stopped");
            }
        }));
        Ok(source)
    }
}

impl Drop for RelayEventSource {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}

#[async_trait]
impl EventSource for RelayEventSource {
    async fn next_event(&mut self) -> Option<ChatEvent> {
        self.receiver.recv().await
    }
}
