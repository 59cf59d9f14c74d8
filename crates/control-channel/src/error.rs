//! Errors raised by the control channel (spec.md §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ControlError>;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("malformed control frame: {0}")]
    Protocol(String),

    #[error("control channel transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
