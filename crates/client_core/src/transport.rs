use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use stomp::StompMessage;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use crate::error::TransportError;

/// Both halves of an open broker connection.
///
/// The connection is gone once `inbound` yields `None`. Dropping every
/// `outbound` sender closes it from our side after queued messages drain.
pub struct TransportChannel {
    pub outbound: mpsc::UnboundedSender<StompMessage>,
    pub inbound: mpsc::UnboundedReceiver<StompMessage>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Value for the `host` header of the CONNECT frame.
    fn host(&self) -> String;
    async fn open(&self) -> Result<TransportChannel>;
}

pub struct WsTransport {
    url: Url,
}

impl WsTransport {
    pub fn new(broker_url: &str) -> std::result::Result<Self, TransportError> {
        let mut url = Url::parse(broker_url)?;
        let scheme = match url.scheme() {
            "ws" | "http" => "ws",
            "wss" | "https" => "wss",
            other => return Err(TransportError::UnsupportedScheme(other.to_string())),
        };
        if url.scheme() != scheme && url.set_scheme(scheme).is_err() {
            return Err(TransportError::UnsupportedScheme(url.scheme().to_string()));
        }
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Transport for WsTransport {
    fn host(&self) -> String {
        self.url.host_str().unwrap_or("localhost").to_string()
    }

    async fn open(&self) -> Result<TransportChannel> {
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(TransportError::Handshake)
            .with_context(|| format!("failed to connect websocket: {}", self.url))?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<StompMessage>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<StompMessage>();

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let ws_message = match String::from_utf8(message.encode()) {
                    Ok(text) => Message::Text(text),
                    Err(err) => Message::Binary(err.into_bytes()),
                };
                if let Err(err) = ws_writer.send(ws_message).await {
                    warn!(error = %err, "stomp: websocket send failed");
                    break;
                }
            }
            let _ = ws_writer.close().await;
            debug!("stomp: websocket writer finished");
        });

        tokio::spawn(async move {
            while let Some(next) = ws_reader.next().await {
                let payload = match next {
                    Ok(Message::Text(text)) => text.into_bytes(),
                    Ok(Message::Binary(bytes)) => bytes,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(err) => {
                        warn!(error = %err, "stomp: websocket receive failed");
                        break;
                    }
                };
                match StompMessage::decode(&payload) {
                    Ok(message) => {
                        if inbound_tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(error = %err, "stomp: dropping undecodable websocket message"),
                }
            }
            debug!("stomp: websocket reader finished");
        });

        Ok(TransportChannel {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
