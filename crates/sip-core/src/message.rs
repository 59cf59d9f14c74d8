//! SIP request/response message model, parser and serializer.
//!
//! Grounded on `original_source/helper/sip_parsers.py::parse_sip_message`
//! and `original_source/receive_server.py`'s response builders, cast into
//! the teacher's `thiserror`/typed-header idiom (`crates/sip-core/src/error.rs`).

use crate::error::{SipError, SipResult};
use crate::header::HeaderMap;
use crate::method::{CSeq, Method};
use crate::sdp::{parse_sdp, serialize_sdp, SdpMessage};
use std::str::FromStr;

/// Either a raw, un-parsed byte body, or a body that parsed as SDP because
/// `Content-Type: application/sdp` was present (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Raw(Vec<u8>),
    Sdp(SdpMessage),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Raw(b) if b.is_empty())
    }

    pub fn as_sdp(&self) -> Option<&SdpMessage> {
        match self {
            Body::Sdp(s) => Some(s),
            Body::Raw(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub uri: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub version: String,
    pub status: u16,
    pub reason: String,
}

/// A parsed SIP message: either a request or a response, each carrying a
/// case-insensitive header multimap and a body (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SipMessage {
    Request {
        line: RequestLine,
        headers: HeaderMap,
        body: Body,
    },
    Response {
        line: StatusLine,
        headers: HeaderMap,
        body: Body,
    },
}

impl SipMessage {
    pub fn headers(&self) -> &HeaderMap {
        match self {
            SipMessage::Request { headers, .. } => headers,
            SipMessage::Response { headers, .. } => headers,
        }
    }

    pub fn body(&self) -> &Body {
        match self {
            SipMessage::Request { body, .. } => body,
            SipMessage::Response { body, .. } => body,
        }
    }

    pub fn call_id(&self) -> Option<&str> {
        self.headers().get("Call-ID")
    }

    pub fn cseq(&self) -> Option<CSeq> {
        self.headers().get("CSeq").and_then(|c| CSeq::parse(c).ok())
    }

    pub fn via(&self) -> Option<&str> {
        self.headers().get("Via")
    }

    pub fn from_header(&self) -> Option<&str> {
        self.headers().get("From")
    }

    pub fn to_header(&self) -> Option<&str> {
        self.headers().get("To")
    }

    pub fn max_forwards(&self) -> u32 {
        self.headers()
            .get("Max-Forwards")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(70)
    }
}

/// Split headers from body on the first blank line, accepting `\r\n\r\n` or
/// `\n\n` (spec.md §4.4's leniency clause).
fn split_headers_and_body(raw: &str) -> SipResult<(&str, &str)> {
    if let Some(pos) = raw.find("\r\n\r\n") {
        return Ok((&raw[..pos], &raw[pos + 4..]));
    }
    if let Some(pos) = raw.find("\n\n") {
        return Ok((&raw[..pos], &raw[pos + 2..]));
    }
    Err(SipError::NoHeaderBodySeparator)
}

/// Parse a full SIP message (start line + headers + optional body) from the
/// bytes of one UDP datagram.
pub fn parse_message(raw: &str) -> SipResult<SipMessage> {
    let (head, body_text) = split_headers_and_body(raw)?;
    let mut lines = head.lines();
    let start_line = lines.next().ok_or(SipError::NoHeaderBodySeparator)?.trim();

    let mut headers = HeaderMap::new();
    for line in lines {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.append(name.trim(), value.trim());
        }
    }

    let body_text = body_text.trim_end_matches(['\r', '\n']);
    let body = if headers.get("Content-Type") == Some("application/sdp") && !body_text.is_empty() {
        match parse_sdp(body_text) {
            Ok(sdp) => Body::Sdp(sdp),
            Err(e) => {
                tracing::warn!("SDP body failed to parse, keeping raw body: {e}");
                Body::Raw(body_text.as_bytes().to_vec())
            }
        }
    } else {
        Body::Raw(body_text.as_bytes().to_vec())
    };

    if start_line.starts_with("SIP/") {
        let mut parts = start_line.splitn(3, ' ');
        let version = parts.next().unwrap_or("SIP/2.0").to_string();
        let status: u16 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| SipError::MalformedStartLine(start_line.to_string()))?;
        let reason = parts.next().unwrap_or("").to_string();
        Ok(SipMessage::Response {
            line: StatusLine {
                version,
                status,
                reason,
            },
            headers,
            body,
        })
    } else {
        let mut parts = start_line.splitn(3, ' ');
        let method_token = parts
            .next()
            .ok_or_else(|| SipError::MalformedStartLine(start_line.to_string()))?;
        let method = Method::from_str(method_token)?;
        let uri = parts
            .next()
            .ok_or_else(|| SipError::MalformedStartLine(start_line.to_string()))?
            .to_string();
        let version = parts.next().unwrap_or("SIP/2.0").to_string();
        Ok(SipMessage::Request {
            line: RequestLine {
                method,
                uri,
                version,
            },
            headers,
            body,
        })
    }
}

fn body_bytes(body: &Body) -> Vec<u8> {
    match body {
        Body::Raw(b) => b.clone(),
        Body::Sdp(sdp) => serialize_sdp(sdp).into_bytes(),
    }
}

/// Serialize a message back to wire bytes, appending `Content-Length` on
/// every message (spec.md §6).
pub fn serialize_message(msg: &SipMessage) -> Vec<u8> {
    let body = body_bytes(msg.body());
    let start_line = match msg {
        SipMessage::Request { line, .. } => {
            format!("{} {} {}", line.method, line.uri, line.version)
        }
        SipMessage::Response { line, .. } => {
            format!("{} {} {}", line.version, line.status, line.reason)
        }
    };

    let mut out = format!("{start_line}\r\n");
    out.push_str(&msg.headers().to_string());
    out.push_str(&format!("Content-Length: {}\r\n", body.len()));
    out.push_str("\r\n");
    let mut bytes = out.into_bytes();
    bytes.extend_from_slice(&body);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVITE: &str = "INVITE sip:192.168.157.126:5062 SIP/2.0\r\nVia: SIP/2.0/UDP 192.168.1.170:5060;branch=z9hG4bK123\r\nMax-Forwards: 70\r\nFrom: \"0903383638\" <sip:0903383638@192.168.1.170>;tag=abc\r\nTo: sip:192.168.157.126\r\nCall-ID: 6zo14J0DbghBJ\r\nCSeq: 26086 INVITE\r\nContent-Type: application/sdp\r\nContent-Length: 100\r\n\r\nv=0\r\no=- 485 654 IN IP4 192.168.1.170\r\ns=-\r\nc=IN IP4 192.168.1.170\r\nt=0 0\r\nm=audio 4000 RTP/AVP 0 8\r\na=rtpmap:0 PCMU/8000\r\n";

    #[test]
    fn parses_invite_request_with_sdp_body() {
        let msg = parse_message(INVITE).unwrap();
        match &msg {
            SipMessage::Request { line, .. } => {
                assert_eq!(line.method, Method::Invite);
                assert_eq!(line.uri, "sip:192.168.157.126:5062");
            }
            SipMessage::Response { .. } => panic!("expected request"),
        }
        assert_eq!(msg.call_id(), Some("6zo14J0DbghBJ"));
        assert_eq!(msg.cseq(), Some(CSeq::parse("26086 INVITE").unwrap()));
        assert!(msg.body().as_sdp().is_some());
    }

    #[test]
    fn lf_only_separator_is_accepted_as_leniency() {
        let raw = "INVITE sip:b SIP/2.0\nCall-ID: x\nCSeq: 1 INVITE\n\n";
        let msg = parse_message(raw).unwrap();
        assert_eq!(msg.call_id(), Some("x"));
    }

    #[test]
    fn missing_separator_is_malformed() {
        let raw = "INVITE sip:b SIP/2.0\nCall-ID: x";
        assert_eq!(parse_message(raw), Err(SipError::NoHeaderBodySeparator));
    }

    #[test]
    fn max_forwards_defaults_to_70_when_absent() {
        let raw = "OPTIONS sip:b SIP/2.0\r\nCall-ID: x\r\nCSeq: 1 OPTIONS\r\n\r\n";
        let msg = parse_message(raw).unwrap();
        assert_eq!(msg.max_forwards(), 70);
    }

    #[test]
    fn response_start_line_parses_status_and_reason() {
        let raw = "SIP/2.0 486 Busy Here\r\nCall-ID: x\r\nCSeq: 1 INVITE\r\n\r\n";
        let msg = parse_message(raw).unwrap();
        match msg {
            SipMessage::Response { line, .. } => {
                assert_eq!(line.status, 486);
                assert_eq!(line.reason, "Busy Here");
            }
            SipMessage::Request { .. } => panic!("expected response"),
        }
    }

    #[test]
    fn serialize_echoes_content_length() {
        let raw = "ACK sip:b SIP/2.0\r\nCall-ID: x\r\nCSeq: 1 ACK\r\n\r\n";
        let msg = parse_message(raw).unwrap();
        let out = String::from_utf8(serialize_message(&msg)).unwrap();
        assert!(out.contains("Content-Length: 0"));
    }

    #[test]
    fn malformed_sdp_body_degrades_to_raw_with_warning() {
        let raw = "INVITE sip:b SIP/2.0\r\nCall-ID: x\r\nCSeq: 1 INVITE\r\nContent-Type: application/sdp\r\nContent-Length: 7\r\n\r\nnotsdp!";
        let msg = parse_message(raw).unwrap();
        assert!(matches!(msg.body(), Body::Raw(_)));
    }
}
