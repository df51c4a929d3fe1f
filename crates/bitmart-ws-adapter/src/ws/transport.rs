/*
[INPUT]:  Endpoint URL per connection key
[OUTPUT]: Opaque duplex text channel (send / close / inbound frames)
[POS]:    WebSocket layer - raw socket seam below the connection workers
[UPDATE]: When changing socket library or frame decoding
*/

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{BitmartError, Result};
use crate::types::ConnectionKey;

const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// One established socket.
///
/// Dropping the connection (or its outbound sender) closes the socket; the
/// inbound channel ending means the peer went away.
#[derive(Debug)]
pub struct WsConnection {
    outbound: mpsc::Sender<String>,
    inbound: mpsc::Receiver<String>,
}

impl WsConnection {
    pub fn new(outbound: mpsc::Sender<String>, inbound: mpsc::Receiver<String>) -> Self {
        Self { outbound, inbound }
    }

    pub async fn send(&self, frame: String) -> Result<()> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| BitmartError::transport("WebSocket send channel closed"))
    }

    /// Next inbound text frame, `None` once the socket is closed
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    pub fn close(self) {
        drop(self);
    }
}

/// Opens sockets for the connection workers
#[async_trait]
pub trait WsTransport: Send + Sync {
    async fn connect(&self, key: ConnectionKey, url: &Url) -> Result<WsConnection>;
}

/// Default transport backed by tokio-tungstenite
#[derive(Debug, Clone)]
pub struct TungsteniteTransport {
    channel_capacity: usize,
}

impl TungsteniteTransport {
    pub fn new() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Default for TungsteniteTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WsTransport for TungsteniteTransport {
    async fn connect(&self, key: ConnectionKey, url: &Url) -> Result<WsConnection> {
        info!(%key, %url, "Connecting WebSocket");
        let (ws_stream, _response) = connect_async(url.as_str())
            .await
            .map_err(BitmartError::transport)?;
        let (mut write, mut read) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(self.channel_capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel::<String>(self.channel_capacity);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = outbound_rx.recv() => {
                        match outbound {
                            Some(frame) => {
                                if let Err(err) = write.send(WsMessage::Text(frame.into())).await {
                                    warn!(%key, error = %err, "WebSocket write failed");
                                    break;
                                }
                            }
                            None => {
                                let _ = write.send(WsMessage::Close(None)).await;
                                break;
                            }
                        }
                    }
                    incoming = read.next() => {
                        match incoming {
                            Some(Ok(WsMessage::Close(frame))) => {
                                debug!(%key, ?frame, "WebSocket closed by peer");
                                let _ = write.send(WsMessage::Close(None)).await;
                                break;
                            }
                            Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => {}
                            Some(Ok(WsMessage::Text(text))) => {
                                if inbound_tx.send(text.to_string()).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                                Ok(text) => {
                                    if inbound_tx.send(text).await.is_err() {
                                        break;
                                    }
                                }
                                Err(err) => {
                                    warn!(%key, error = %err, bytes = bytes.len(), "Dropping non UTF-8 binary frame");
                                }
                            },
                            Some(Ok(_)) => {}
                            Some(Err(err)) => {
                                warn!(%key, error = %err, "WebSocket read failed");
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }
            debug!(%key, "WebSocket io task finished");
        });

        Ok(WsConnection::new(outbound_tx, inbound_rx))
    }
}
