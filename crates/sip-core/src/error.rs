//! Error types for SIP and SDP parsing.

use thiserror::Error;

/// Result type alias for SIP operations.
pub type SipResult<T> = std::result::Result<T, SipError>;
/// Result type alias for SDP operations.
pub type SdpResult<T> = std::result::Result<T, SdpError>;

/// Errors raised while parsing or serializing a SIP message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SipError {
    /// The message had no blank line separating headers from body.
    #[error("malformed SIP message: no header/body separator")]
    NoHeaderBodySeparator,

    /// The first line was neither a valid request line nor status line.
    #[error("malformed SIP start line: {0}")]
    MalformedStartLine(String),

    /// A required header was absent.
    #[error("missing required header: {0}")]
    MissingHeader(String),

    /// The method token did not match any known SIP method.
    #[error("invalid SIP method: {0}")]
    InvalidMethod(String),

    /// The CSeq header was not `<number> <METHOD>`.
    #[error("malformed CSeq header: {0}")]
    MalformedCSeq(String),
}

/// Errors raised while parsing or serializing an SDP session description.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdpError {
    /// The session description had no body at all.
    #[error("empty SDP message")]
    Empty,

    /// A required session-level or media-level field was missing.
    #[error("missing required SDP field: {0}")]
    MissingField(String),
}
