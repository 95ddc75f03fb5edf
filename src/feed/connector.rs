use super::assembler::FeedFrame;
use crate::error::{Error, Result};
use crate::remote::IDENTITY_HEADER;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::time::Duration;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// Frames from one live connection. The stream ends when the server closes.
pub type FeedStream = BoxStream<'static, Result<FeedFrame>>;

/// Opens connections to the push endpoint.
#[async_trait::async_trait]
pub trait FeedConnector: Send + Sync {
    async fn connect(&self) -> Result<FeedStream>;
}

/// WebSocket transport for the live feed.
pub struct WebSocketConnector {
    url: String,
    identity: String,
    dial_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>, identity: impl Into<String>, dial_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            identity: identity.into(),
            dial_timeout,
        }
    }
}

#[async_trait::async_trait]
impl FeedConnector for WebSocketConnector {
    async fn connect(&self) -> Result<FeedStream> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Connection(format!("bad feed URL '{}': {e}", self.url)))?;
        let identity = HeaderValue::from_str(&self.identity)
            .map_err(|e| Error::Connection(format!("identity is not a valid header: {e}")))?;
        request.headers_mut().insert(IDENTITY_HEADER, identity);

        let (socket, _response) =
            tokio::time::timeout(self.dial_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| Error::Connection(format!("dial timed out after {:?}", self.dial_timeout)))?
                .map_err(|e| Error::Connection(e.to_string()))?;

        debug!(url = %self.url, "Feed socket open");

        // Only the read half is used; pings are answered by tungstenite.
        let frames = socket.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(FeedFrame::message(text.as_bytes()))),
                Ok(Message::Binary(data)) => Some(Ok(FeedFrame::message(data.to_vec()))),
                Ok(Message::Frame(frame)) => Some(Ok(FeedFrame {
                    payload: frame.payload().to_vec(),
                    fin: frame.header().is_final,
                })),
                Ok(Message::Ping(_) | Message::Pong(_)) => None,
                Ok(Message::Close(reason)) => {
                    debug!(?reason, "Feed closed by server");
                    None
                }
                Err(e) => Some(Err(Error::Connection(e.to_string()))),
            }
        });

        Ok(frames.boxed())
    }
}
