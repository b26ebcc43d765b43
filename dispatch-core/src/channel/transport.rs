//! Frame transports for the push channel.

use crate::error::{Result, SyncError};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::fmt;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest, http::HeaderValue, protocol::Message,
    },
};
use tracing::{debug, warn};
use url::Url;

/// An open session: text frames out, text frames in. The inbound side
/// closes when the peer goes away.
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
}

impl Link {
    /// Linked pair of channels, returning the session and the peer's
    /// `(sender into inbound, receiver of outbound)` ends.
    pub fn pair(
        buffer: usize,
    ) -> (Self, mpsc::Sender<String>, mpsc::Receiver<String>) {
        let (outbound, peer_rx) = mpsc::channel(buffer.max(1));
        let (peer_tx, inbound) = mpsc::channel(buffer.max(1));
        (Self { outbound, inbound }, peer_tx, peer_rx)
    }
}

#[async_trait]
pub trait PushTransport: Send + Sync + fmt::Debug {
    async fn open(&self) -> Result<Link>;
}

/// WebSocket transport. Each session is pumped by its own task that
/// bridges the socket to the [`Link`] channels.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: Url,
    token: Option<String>,
    buffer: usize,
}

impl WsTransport {
    pub fn new(url: Url, token: Option<String>) -> Self {
        Self {
            url,
            token,
            buffer: 256,
        }
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }
}

#[async_trait]
impl PushTransport for WsTransport {
    async fn open(&self) -> Result<Link> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| SyncError::Transport(e.to_string()))?;
            request.headers_mut().insert("Authorization", value);
        }

        let (socket, _) = connect_async(request).await?;
        debug!(url = %self.url, "push socket connected");
        let (mut sink, mut stream) = socket.split();
        let (link, peer_tx, mut peer_rx) = Link::pair(self.buffer);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    incoming = stream.next() => match incoming {
                        Some(Ok(Message::Text(text))) => {
                            if peer_tx.send(text).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "push socket closed by server");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!(error = %err, "push socket error");
                            break;
                        }
                        None => break,
                    },
                    outgoing = peer_rx.recv() => match outgoing {
                        Some(text) => {
                            if let Err(err) = sink.send(Message::Text(text)).await {
                                warn!(error = %err, "failed to write push frame");
                                break;
                            }
                        }
                        None => {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                    },
                }
            }
        });

        Ok(link)
    }
}
