//! Errors raised by RTP framing, the port allocator and the RTP engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RtpError>;

#[derive(Error, Debug)]
pub enum RtpError {
    #[error("malformed RTP packet: {0}")]
    MalformedPacket(String),

    #[error("no ports available in the configured range")]
    NoPorts,

    #[error("RTP transport error: {0}")]
    Transport(#[from] std::io::Error),
}
