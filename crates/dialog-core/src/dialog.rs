//! A single SIP dialog: its state machine, ownership of one RTP engine and
//! port pair, and its retransmission cache (spec.md §3, §4.5).
//!
//! The state names are grounded on the teacher's
//! `crates/session-core/src/dialog/types.rs::DialogState` (Creating/Early/
//! Confirmed/Terminated/Failed), narrowed to the transitions spec.md §4.5
//! actually names.

use relay_rtp::{PayloadType, RtpEngine};
use relay_sip_core::Method;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

/// Call-ID, the natural dialog key (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DialogId(pub String);

impl DialogId {
    pub fn new(call_id: impl Into<String>) -> Self {
        DialogId(call_id.into())
    }
}

impl std::fmt::Display for DialogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// spec.md §4.5's named states, both directions of the call
/// (`IDLE → CALLING | RINGING | EARLY → ANSWERED → ESTABLISHED →
/// TERMINATING → TERMINATED`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogState {
    /// Outbound only: INVITE built but not yet sent.
    Idle,
    /// Outbound only: INVITE sent, no response yet.
    Calling,
    /// Outbound only: a 180 Ringing was received.
    Ringing,
    /// Outbound only: a 183 Session Progress (early media) was received.
    Early,
    /// Inbound only: 200 OK sent, ACK not yet received.
    Answered,
    /// Both directions: media may flow.
    Established,
    /// BYE sent or received, waiting for the transaction to close.
    Terminating,
    Terminated,
    Failed(String),
}

/// One live call (spec.md §3's `Dialog` record).
pub struct Dialog {
    pub id: DialogId,
    pub direction: Direction,
    pub state: DialogState,
    pub local_addr: SocketAddr,
    pub remote_addr: SocketAddr,
    pub local_tag: String,
    pub remote_tag: Option<String>,
    pub local_cseq: u32,
    pub rtp: RtpEngine,
    pub rtp_port: u16,
    pub rtcp_port: u16,
    pub payload_type: PayloadType,
    pub created_at: Instant,
    pub answered_at: Option<Instant>,
    pub terminated_at: Option<Instant>,
    pub ack_sent: bool,
    pub from_header: String,
    pub to_header: String,
    pub via_header: String,
    /// `(CSeq number, Via branch) -> serialized response`, consulted before
    /// re-running the state machine on a duplicate request (spec.md §4.5).
    pub retransmission_cache: HashMap<(u32, String), Vec<u8>>,
}

impl Dialog {
    pub fn cache_response(&mut self, cseq: u32, branch: &str, response: Vec<u8>) {
        self.retransmission_cache
            .insert((cseq, branch.to_string()), response);
    }

    pub fn cached_response(&self, cseq: u32, branch: &str) -> Option<&Vec<u8>> {
        self.retransmission_cache.get(&(cseq, branch.to_string()))
    }

    pub fn next_cseq(&mut self, method: Method) -> relay_sip_core::CSeq {
        self.local_cseq += 1;
        relay_sip_core::CSeq {
            number: self.local_cseq,
            method,
        }
    }
}
