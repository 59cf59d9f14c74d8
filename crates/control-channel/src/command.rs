//! `ControlCommand` wire grammar (spec.md §3, §6).
//!
//! Grounded 1:1 on `original_source/helper/ws_command.py::WSCommandHelper`
//! and `model/ws_command.py::CommandType`/`WebSocketCommand`: a tag up to
//! the first `:`, an optional content tail, `CALL:` content validated
//! against the `^\+?\d{7,15}$` phone pattern. The original matches the tag
//! with one regex; here each tag is a literal compared directly, since the
//! tag set is closed and small.

use crate::error::ControlError;
use std::fmt;

/// spec.md §3/§6's closed tag set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Call,
    Rtp,
    CallAns,
    CallIgnore,
    Hangup,
    Bye,
    RingAns,
    RingIgnore,
    CallFailed,
}

impl ControlCommand {
    fn tag(&self) -> &'static str {
        match self {
            ControlCommand::Call => "CALL",
            ControlCommand::Rtp => "RTP",
            ControlCommand::CallAns => "CALL_ANS",
            ControlCommand::CallIgnore => "CALL_IGNORE",
            ControlCommand::Hangup => "HANGUP",
            ControlCommand::Bye => "BYE",
            ControlCommand::RingAns => "RING_ANS",
            ControlCommand::RingIgnore => "RING_IGNORE",
            ControlCommand::CallFailed => "CALL_FAILED",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "CALL" => ControlCommand::Call,
            "RTP" => ControlCommand::Rtp,
            "CALL_ANS" => ControlCommand::CallAns,
            "CALL_IGNORE" => ControlCommand::CallIgnore,
            "HANGUP" => ControlCommand::Hangup,
            "BYE" => ControlCommand::Bye,
            "RING_ANS" => ControlCommand::RingAns,
            "RING_IGNORE" => ControlCommand::RingIgnore,
            "CALL_FAILED" => ControlCommand::CallFailed,
            _ => return None,
        })
    }
}

/// A parsed frame: its tag plus the optional `content` tail (spec.md §3:
/// "Each command carries an optional string `content`").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFrame {
    pub command: ControlCommand,
    pub content: Option<String>,
}

impl ControlFrame {
    pub fn new(command: ControlCommand, content: Option<impl Into<String>>) -> Self {
        ControlFrame {
            command,
            content: content.map(Into::into),
        }
    }

    /// Parse one text frame. Anything not matching a known tag, or a
    /// `CALL:` whose content fails the phone pattern, is rejected with
    /// `ControlError::Protocol` and must be logged-and-dropped by the
    /// caller without closing the connection (spec.md §6, §7, §8 S6).
    pub fn parse(raw: &str) -> Result<Self, ControlError> {
        let (tag, content) = match raw.split_once(':') {
            Some((tag, content)) => (tag, Some(content.to_string())),
            None => (raw, None),
        };

        let command = ControlCommand::from_tag(tag)
            .ok_or_else(|| ControlError::Protocol(format!("unrecognized tag: {raw}")))?;

        if command == ControlCommand::Call {
            let phone = content
                .as_deref()
                .ok_or_else(|| ControlError::Protocol("CALL with no phone number".to_string()))?;
            if !is_valid_phone(phone) {
                return Err(ControlError::Protocol(format!(
                    "invalid phone number: {phone}"
                )));
            }
        }

        Ok(ControlFrame { command, content })
    }
}

impl fmt::Display for ControlFrame {
    /// `TAG` or `TAG:content` (spec.md §3).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.content {
            Some(content) => write!(f, "{}:{content}", self.command.tag()),
            None => write!(f, "{}", self.command.tag()),
        }
    }
}

/// `^\+?\d{7,15}$`, hand-rolled since the workspace carries no `regex`
/// dependency and the grammar is this small (spec.md §6).
fn is_valid_phone(s: &str) -> bool {
    let digits = s.strip_prefix('+').unwrap_or(s);
    (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}
