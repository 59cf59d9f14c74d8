//! Error kinds for the dialog manager (spec.md §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DialogError>;

#[derive(Error, Debug)]
pub enum DialogError {
    #[error("malformed SIP message: {0}")]
    MalformedPacket(#[from] relay_sip_core::SipError),

    #[error("bad SDP: {0}")]
    BadSdp(#[from] relay_sip_core::SdpError),

    #[error("message for unknown dialog: {0}")]
    UnknownDialog(String),

    #[error("a dialog already exists for Call-ID {0}")]
    DialogExists(String),

    #[error("INVITE timed out waiting for a final response")]
    InviteTimeout,

    #[error("no codec in common with the offer")]
    CodecUnsupported,

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("RTP engine error: {0}")]
    Rtp(#[from] relay_rtp::RtpError),
}
