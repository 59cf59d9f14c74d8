//! RFC 4566 session/media description parser and serializer.
//!
//! Grounded on `original_source/helper/sip_parsers.py::parse_sdp_message`:
//! split the body at the first `m=` line into a session-level block and
//! zero-or-more media-level blocks, then parse each block line-by-line
//! against a field table. Unknown letters log-and-skip.

use crate::error::{SdpError, SdpResult};
use tracing::warn;

/// One `m=`-delimited media block: the media line itself, an optional
/// media-level `c=` line, and any `a=` attribute lines.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaDescription {
    pub m: String,
    pub c: Option<String>,
    pub a: Vec<String>,
}

impl MediaDescription {
    /// `m=audio 4000 RTP/AVP 0 8 96` -> `("audio", 4000, ["0","8","96"])`.
    pub fn parse_media_line(&self) -> Option<(&str, u16, Vec<u16>)> {
        let mut parts = self.m.split_whitespace();
        let media_type = parts.next()?;
        let port: u16 = parts.next()?.parse().ok()?;
        let _proto = parts.next()?;
        let payload_types = parts.filter_map(|p| p.parse().ok()).collect();
        Some((media_type, port, payload_types))
    }

    /// Look up `a=rtpmap:<pt> <codec>/<rate>` for a given payload type.
    pub fn rtpmap(&self, payload_type: u16) -> Option<(&str, u32)> {
        self.a.iter().find_map(|attr| {
            let rest = attr.strip_prefix("rtpmap:")?;
            let (pt_str, codec_info) = rest.split_once(' ')?;
            if pt_str.trim().parse::<u16>().ok()? != payload_type {
                return None;
            }
            let mut codec_parts = codec_info.splitn(2, '/');
            let codec = codec_parts.next()?;
            let rate = codec_parts.next().and_then(|r| r.parse().ok()).unwrap_or(8000);
            Some((codec, rate))
        })
    }
}

/// A parsed SDP session description (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SdpMessage {
    pub v: String,
    pub o: String,
    pub s: String,
    pub c: Option<String>,
    pub t: Vec<String>,
    pub media: Vec<MediaDescription>,
}

impl SdpMessage {
    /// The connection line that governs the first audio media block:
    /// media-level `c=` wins over session-level (spec.md §8 boundary
    /// behaviour).
    pub fn audio_connection(&self) -> Option<&str> {
        let audio = self.media.iter().find(|m| m.m.starts_with("audio"))?;
        audio.c.as_deref().or(self.c.as_deref())
    }

    pub fn first_audio(&self) -> Option<&MediaDescription> {
        self.media.iter().find(|m| m.m.starts_with("audio"))
    }
}

struct FieldBlock {
    v: Option<String>,
    o: Option<String>,
    s: Option<String>,
    c: Option<String>,
    t: Vec<String>,
    m: Option<String>,
    a: Vec<String>,
}

fn parse_field_block(text: &str) -> FieldBlock {
    let mut block = FieldBlock {
        v: None,
        o: None,
        s: None,
        c: None,
        t: Vec::new(),
        m: None,
        a: Vec::new(),
    };

    for line in text.lines() {
        let line = line.trim();
        let Some((letter, value)) = line.split_once('=') else {
            continue;
        };
        let letter = letter.trim();
        let value = value.trim().to_string();
        match letter {
            "v" => block.v = Some(value),
            "o" => block.o = Some(value),
            "s" => block.s = Some(value),
            "c" => block.c = Some(value),
            "t" => block.t.push(value),
            "m" => block.m = Some(value),
            "a" => block.a.push(value),
            "" => {}
            other => warn!("unknown SDP field, skipping: {other}={value}"),
        }
    }
    block
}

/// Parse an SDP body per RFC 4566 (spec.md §4.4).
pub fn parse_sdp(body: &str) -> SdpResult<SdpMessage> {
    if body.trim().is_empty() {
        return Err(SdpError::Empty);
    }

    let (session_text, media_text) = match body.find("\nm=") {
        Some(pos) => (&body[..pos], &body[pos + 1..]),
        None if body.starts_with("m=") => ("", body),
        None => (body, ""),
    };

    let session = parse_field_block(session_text);

    let mut media = Vec::new();
    if !media_text.is_empty() {
        let mut first = true;
        for block_text in media_text.split("\nm=") {
            let block_text = if first {
                first = false;
                block_text.to_string()
            } else {
                format!("m={block_text}")
            };
            let block = parse_field_block(&block_text);
            let m = block.m.ok_or_else(|| SdpError::MissingField("m".into()))?;
            media.push(MediaDescription {
                m,
                c: block.c,
                a: block.a,
            });
        }
    }

    if media.is_empty() {
        return Err(SdpError::MissingField("m".into()));
    }

    Ok(SdpMessage {
        v: session.v.ok_or_else(|| SdpError::MissingField("v".into()))?,
        o: session.o.ok_or_else(|| SdpError::MissingField("o".into()))?,
        s: session.s.ok_or_else(|| SdpError::MissingField("s".into()))?,
        c: session.c,
        t: {
            if session.t.is_empty() {
                return Err(SdpError::MissingField("t".into()));
            }
            session.t
        },
        media,
    })
}

/// Serialize `v, o, s, c, t*, (m, a*)*` in that order, CRLF-terminated
/// (spec.md §4.4).
pub fn serialize_sdp(sdp: &SdpMessage) -> String {
    let mut out = String::new();
    out.push_str(&format!("v={}\r\n", sdp.v));
    out.push_str(&format!("o={}\r\n", sdp.o));
    out.push_str(&format!("s={}\r\n", sdp.s));
    if let Some(c) = &sdp.c {
        out.push_str(&format!("c={c}\r\n"));
    }
    for t in &sdp.t {
        out.push_str(&format!("t={t}\r\n"));
    }
    for media in &sdp.media {
        out.push_str(&format!("m={}\r\n", media.m));
        if let Some(c) = &media.c {
            out.push_str(&format!("c={c}\r\n"));
        }
        for a in &media.a {
            out.push_str(&format!("a={a}\r\n"));
        }
    }
    out
}
