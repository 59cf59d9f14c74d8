//! Dialog manager configuration (spec.md §1, ambient "config" concern —
//! SPEC_FULL.md §1.1). Plain struct with a `Default` impl; no env/CLI
//! loading lives here, that is `relay`'s job.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DialogManagerConfig {
    /// IP the RTP engines bind their UDP sockets on.
    pub local_rtp_ip: IpAddr,
    /// Local SIP signalling address, used to build `Via`/`Contact`.
    pub local_sip_ip: IpAddr,
    pub local_sip_port: u16,
    /// Registrar/peer the relay sends outbound INVITEs and BYEs to.
    pub sip_server_ip: IpAddr,
    pub sip_server_port: u16,
    pub rtp_port_range: (u16, u16),
    /// Preferred-first codec order used when answering an offer
    /// (spec.md §4.5: "PCMA preferred, then PCMU").
    pub preferred_codecs: Vec<relay_rtp::PayloadType>,
    pub send_queue_capacity: usize,
    pub recv_queue_capacity: usize,
    pub invite_timeout: Duration,
    pub shutdown_grace: Duration,
    /// Directory call recordings are written to on BYE; `None` disables
    /// recording entirely (spec.md §6).
    pub recording_dir: Option<PathBuf>,
    /// Linear PCM played into the call right after ACK, if configured
    /// (spec.md §4.5, grounded on `receive_server.py`'s optional
    /// `./output/transcode/greeting.wav` playback).
    pub greeting_pcm: Option<Vec<u8>>,
}

impl Default for DialogManagerConfig {
    fn default() -> Self {
        DialogManagerConfig {
            local_rtp_ip: IpAddr::from([0, 0, 0, 0]),
            local_sip_ip: IpAddr::from([127, 0, 0, 1]),
            local_sip_port: 5060,
            sip_server_ip: IpAddr::from([127, 0, 0, 1]),
            sip_server_port: 5060,
            rtp_port_range: (31000, 31100),
            preferred_codecs: vec![relay_rtp::PayloadType::Pcma, relay_rtp::PayloadType::Pcmu],
            send_queue_capacity: 500,
            recv_queue_capacity: 500,
            invite_timeout: Duration::from_secs(32),
            shutdown_grace: Duration::from_secs(2),
            recording_dir: None,
            greeting_pcm: None,
        }
    }
}
