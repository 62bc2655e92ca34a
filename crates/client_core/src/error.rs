use stomp::{Command, FrameError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid broker url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unsupported broker url scheme `{0}`; expected ws, wss, http or https")]
    UnsupportedScheme(String),
    #[error("websocket handshake failed: {0}")]
    Handshake(#[source] tokio_tungstenite::tungstenite::Error),
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("transport failed to open: {0:#}")]
    Transport(anyhow::Error),
    #[error("broker rejected CONNECT: {0}")]
    Rejected(String),
    #[error("connection closed during handshake")]
    ClosedDuringHandshake,
    #[error("unexpected {0} frame during handshake")]
    UnexpectedFrame(Command),
    #[error("invalid CONNECTED frame: {0}")]
    InvalidConnected(#[from] FrameError),
}
