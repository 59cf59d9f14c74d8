//! SIP method tokens.

use crate::error::SipError;
use std::fmt;
use std::str::FromStr;

/// A SIP method, as named in spec.md §4.4. Only `Invite`/`Ack`/`Bye`/
/// `Cancel` are acted upon; the rest are recognized only so the server can
/// reply `501 Not Implemented` instead of dropping the datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Register,
    Invite,
    Ack,
    Bye,
    Cancel,
    Update,
    Refer,
    Prack,
    Subscribe,
    Notify,
    Publish,
    Message,
    Info,
    Options,
}

impl Method {
    /// Methods the dialog manager actually drives a state transition for.
    pub fn is_acted_on(self) -> bool {
        matches!(self, Method::Invite | Method::Ack | Method::Bye | Method::Cancel)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Register => "REGISTER",
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
            Method::Update => "UPDATE",
            Method::Refer => "REFER",
            Method::Prack => "PRACK",
            Method::Subscribe => "SUBSCRIBE",
            Method::Notify => "NOTIFY",
            Method::Publish => "PUBLISH",
            Method::Message => "MESSAGE",
            Method::Info => "INFO",
            Method::Options => "OPTIONS",
        };
        f.write_str(s)
    }
}

impl FromStr for Method {
    type Err = SipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "REGISTER" => Method::Register,
            "INVITE" => Method::Invite,
            "ACK" => Method::Ack,
            "BYE" => Method::Bye,
            "CANCEL" => Method::Cancel,
            "UPDATE" => Method::Update,
            "REFER" => Method::Refer,
            "PRACK" => Method::Prack,
            "SUBSCRIBE" => Method::Subscribe,
            "NOTIFY" => Method::Notify,
            "PUBLISH" => Method::Publish,
            "MESSAGE" => Method::Message,
            "INFO" => Method::Info,
            "OPTIONS" => Method::Options,
            other => return Err(SipError::InvalidMethod(other.to_string())),
        })
    }
}

/// `<number> <METHOD>`, parsed and compared numerically rather than by
/// string containment (REDESIGN FLAGS, spec.md §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CSeq {
    pub number: u32,
    pub method: Method,
}

impl CSeq {
    pub fn parse(raw: &str) -> Result<Self, SipError> {
        let raw = raw.trim();
        let mut parts = raw.splitn(2, char::is_whitespace);
        let number: u32 = parts
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| SipError::MalformedCSeq(raw.to_string()))?;
        let method = parts
            .next()
            .ok_or_else(|| SipError::MalformedCSeq(raw.to_string()))?
            .trim()
            .parse()?;
        Ok(CSeq { number, method })
    }
}

impl fmt::Display for CSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.number, self.method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cseq_parses_number_and_method() {
        let cseq = CSeq::parse("26086 INVITE").unwrap();
        assert_eq!(cseq.number, 26086);
        assert_eq!(cseq.method, Method::Invite);
    }

    #[test]
    fn cseq_compares_numerically_not_by_substring() {
        // "1 INVITE" historically matched a string-containment check for
        // "BYE" if it appeared anywhere; numeric comparison never does.
        let invite = CSeq::parse("1 INVITE").unwrap();
        let bye = CSeq::parse("2 BYE").unwrap();
        assert_ne!(invite.method, bye.method);
        assert!(invite.number < bye.number);
    }

    #[test]
    fn unknown_method_is_rejected() {
        assert!("FOO".parse::<Method>().is_err());
    }
}
