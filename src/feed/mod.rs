//! Live push feed of add/delete events.
//!
//! `LiveFeed` keeps one connection open to the push endpoint and hands every
//! domain of every decoded event to a [`FeedHandlers`]. Connection loss of
//! any kind leads back to `Disconnected`, a fixed delay, and a new dial; the
//! loop only ends when its cancellation token fires.

mod assembler;
mod connector;

pub use self::assembler::{FeedFrame, FrameAssembler, MAX_MESSAGE_SIZE};
pub use self::connector::{FeedConnector, FeedStream, WebSocketConnector};

use crate::error::{Error, Result};
use crate::remote::{ChangeEvent, ChangeKind};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Receives feed events, one domain at a time, in arrival order.
pub trait FeedHandlers: Send + Sync {
    fn on_add(&self, domain: &str);
    fn on_delete(&self, domain: &str);

    /// A frame that could not be decoded. The connection stays open.
    fn on_error(&self, _error: &Error) {}
}

pub struct LiveFeed {
    connector: Arc<dyn FeedConnector>,
    handlers: Arc<dyn FeedHandlers>,
    reconnect_delay: Duration,
    state: watch::Sender<ConnectionState>,
}

/// Why a connected session ended.
enum SessionEnd {
    Cancelled,
    Lost,
}

impl LiveFeed {
    pub fn new(
        connector: Arc<dyn FeedConnector>,
        handlers: Arc<dyn FeedHandlers>,
        reconnect_delay: Duration,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            handlers,
            reconnect_delay,
            state,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            self.set_state(ConnectionState::Connecting);

            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                res = self.connector.connect() => res,
            };

            match connected {
                Ok(stream) => {
                    self.set_state(ConnectionState::Connected);
                    info!("Live feed connected");
                    if let SessionEnd::Cancelled = self.receive(stream, &cancel).await {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Live feed connection failed");
                }
            }

            self.set_state(ConnectionState::Disconnected);
            debug!(delay = ?self.reconnect_delay, "Waiting before reconnecting live feed");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("Live feed stopped");
    }

    async fn receive(&self, mut stream: FeedStream, cancel: &CancellationToken) -> SessionEnd {
        let mut assembler = FrameAssembler::new();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(frame)) => match assembler.push(frame) {
                    Ok(Some(message)) => {
                        if let Err(e) = self.dispatch(&message) {
                            self.report(&e);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => self.report(&e),
                },
                Some(Err(e)) => {
                    warn!(error = %e, "Live feed read failed");
                    return SessionEnd::Lost;
                }
                None => {
                    info!("Live feed closed");
                    return SessionEnd::Lost;
                }
            }
        }
    }

    /// Decodes one complete message and notifies the handlers for each
    /// domain, in list order.
    pub fn dispatch(&self, message: &[u8]) -> Result<ChangeEvent> {
        let event: ChangeEvent =
            serde_json::from_slice(message).map_err(|e| Error::Decode(e.to_string()))?;

        debug!(kind = ?event.kind, count = event.domains.len(), "Feed event");
        for domain in &event.domains {
            match event.kind {
                ChangeKind::Add => self.handlers.on_add(domain),
                ChangeKind::Delete => self.handlers.on_delete(domain),
            }
        }
        Ok(event)
    }

    fn report(&self, error: &Error) {
        warn!(error = %error, "Dropping undecodable feed message");
        self.handlers.on_error(error);
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}
