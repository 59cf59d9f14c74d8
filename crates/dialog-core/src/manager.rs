//! The Dialog Manager: routes inbound SIP datagrams to dialog state
//! transitions, originates outbound calls, and owns the per-dialog RTP
//! engines and port allocations (spec.md §4.5).
//!
//! Grounded on `original_source/receive_server.py::RelayServer`'s
//! `_handle_invite`/`_handle_ack`/`_handle_send_ack`/`_handle_bye`/
//! `_handle_cancel`/`_handle_response`/`_handle_call`/`_build_invite_message`
//! for the transition algorithm, with the two Open Questions (spec.md §9)
//! resolved per SPEC_FULL.md §4.5: a locally generated `To`-tag on every
//! 200 OK, and numeric (not string-containment) CSeq comparison.

use crate::config::DialogManagerConfig;
use crate::dialog::{Dialog, DialogId, DialogState, Direction};
use crate::error::{DialogError, Result};
use relay_codec::wav;
use relay_rtp::{AudioQueue, PayloadType, PortAllocator, RtpEngine};
use relay_sip_core::{
    parse_message, serialize_message, Body, CSeq, HeaderMap, MediaDescription, Method,
    RequestLine, SdpMessage, SipMessage, StatusLine,
};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;

/// The hook the Dialog Manager calls into when a dialog enters or leaves
/// `ESTABLISHED`, so a Media Bridge can be attached without this crate
/// depending on `relay-media-bridge` (the sink-callback fix from spec.md §9,
/// applied again at this seam).
pub trait MediaBridgeHook: Send + Sync {
    fn on_established(&self, dialog_id: &DialogId, rtp: RtpEngine);
    fn on_terminated(&self, dialog_id: &DialogId);
}

/// A hook that does nothing; useful for tests and standalone SIP/RTP use
/// of this crate without a Media Bridge wired up.
pub struct NoopMediaBridgeHook;

impl MediaBridgeHook for NoopMediaBridgeHook {
    fn on_established(&self, _dialog_id: &DialogId, _rtp: RtpEngine) {}
    fn on_terminated(&self, _dialog_id: &DialogId) {}
}

/// Owns the UDP signalling socket, the dialog table, and the port
/// allocator. One instance serves the whole relay (spec.md §3:
/// "The Dialog Manager owns the Dialog table").
pub struct DialogManager {
    config: DialogManagerConfig,
    socket: UdpSocket,
    dialogs: Mutex<HashMap<DialogId, Dialog>>,
    ports: Mutex<PortAllocator>,
    control_sink: Arc<AudioQueue<String>>,
    media_hook: Arc<dyn MediaBridgeHook>,
    closed: AtomicBool,
}

impl DialogManager {
    /// Bind the SIP UDP listener and construct an empty dialog table.
    pub async fn bind(
        config: DialogManagerConfig,
        control_sink: Arc<AudioQueue<String>>,
        media_hook: Arc<dyn MediaBridgeHook>,
    ) -> Result<Arc<Self>> {
        let local = SocketAddr::new(config.local_sip_ip, config.local_sip_port);
        let socket = UdpSocket::bind(local).await?;
        let ports = PortAllocator::new(config.rtp_port_range.0, config.rtp_port_range.1);
        Ok(Arc::new(DialogManager {
            config,
            socket,
            dialogs: Mutex::new(HashMap::new()),
            ports: Mutex::new(ports),
            control_sink,
            media_hook,
            closed: AtomicBool::new(false),
        }))
    }

    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    /// The address the SIP UDP listener actually bound to. Mainly useful in
    /// tests that bind on port 0 and need to learn the ephemeral port.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Number of dialogs currently in the table (spec.md §8 property 5 and
    /// the S5 scenario's "leave the Dialog table unchanged in size").
    pub fn dialog_count(&self) -> usize {
        self.dialogs.lock().unwrap().len()
    }

    /// Drive the SIP UDP receive loop until `shutdown()` is called. The 1s
    /// recv timeout is the suspension point spec.md §5 calls for to observe
    /// the shutdown flag.
    pub async fn run(self: Arc<Self>) {
        let mut buf = [0u8; 4096];
        loop {
            if self.closed.load(Ordering::Relaxed) {
                break;
            }
            match tokio::time::timeout(Duration::from_secs(1), self.socket.recv_from(&mut buf)).await {
                Ok(Ok((n, src))) => {
                    let raw = String::from_utf8_lossy(&buf[..n]).into_owned();
                    let this = self.clone();
                    tokio::spawn(async move { this.handle_datagram(&raw, src).await });
                }
                Ok(Err(e)) => tracing::warn!("SIP socket recv_from error: {e}"),
                Err(_elapsed) => {}
            }
        }
    }

    async fn handle_datagram(&self, raw: &str, src: SocketAddr) {
        let message = match parse_message(raw) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("dropping malformed SIP datagram from {src}: {e}");
                return;
            }
        };

        match &message {
            SipMessage::Request { .. } => self.handle_request(message, src).await,
            SipMessage::Response { .. } => self.handle_response(message, src).await,
        }
    }

    // ---- inbound requests -------------------------------------------------

    async fn handle_request(&self, request: SipMessage, src: SocketAddr) {
        let SipMessage::Request { line, .. } = &request else {
            unreachable!()
        };
        let Some(call_id) = request.call_id().map(str::to_string) else {
            tracing::warn!("request missing Call-ID, dropping");
            return;
        };

        if let Some(cached) = self.retransmitted_response(&call_id, &request) {
            if let Err(e) = self.socket.send_to(&cached, src).await {
                tracing::warn!("failed to resend cached response to {src}: {e}");
            }
            return;
        }

        let method = line.method;
        let result = match method {
            Method::Invite => self.handle_invite(&request, &call_id, src).await,
            Method::Ack => self.handle_ack(&call_id).await,
            Method::Bye => self.handle_bye(&request, &call_id, src, true).await,
            Method::Cancel => self.handle_bye(&request, &call_id, src, false).await,
            _ => {
                let bytes = self.build_error_response(&request, 501, "Not Implemented");
                let _ = self.socket.send_to(&bytes, src).await;
                return;
            }
        };

        if let Err(e) = result {
            tracing::warn!("{method} for call {call_id} failed: {e}");
        }
    }

    /// Consult the dialog's retransmission cache: same CSeq number and Via
    /// branch as a request already answered means the state machine must
    /// not re-run (spec.md §4.5).
    fn retransmitted_response(&self, call_id: &str, request: &SipMessage) -> Option<Vec<u8>> {
        let cseq = request.cseq()?;
        let branch = extract_branch(request.via()?)?;
        let dialogs = self.dialogs.lock().unwrap();
        let dialog = dialogs.get(&DialogId::new(call_id))?;
        dialog.cached_response(cseq.number, &branch).cloned()
    }

    async fn handle_invite(&self, request: &SipMessage, call_id: &str, src: SocketAddr) -> Result<()> {
        let dialog_id = DialogId::new(call_id);
        if self.dialogs.lock().unwrap().contains_key(&dialog_id) {
            let bytes = self.build_error_response(request, 488, "Not Acceptable Here");
            self.socket.send_to(&bytes, src).await?;
            return Err(DialogError::DialogExists(call_id.to_string()));
        }

        let offer = request.body().as_sdp().ok_or_else(|| {
            DialogError::BadSdp(relay_sip_core::SdpError::Empty)
        })?;
        let audio = offer.first_audio().ok_or(DialogError::CodecUnsupported)?;

        let payload_type = negotiate_codec(audio, &self.config.preferred_codecs)
            .ok_or(DialogError::CodecUnsupported)?;

        let (_, remote_port, _) = audio.parse_media_line().ok_or_else(|| {
            DialogError::BadSdp(relay_sip_core::SdpError::MissingField("m".into()))
        })?;
        let remote_ip = offer
            .audio_connection()
            .and_then(parse_connection_ip)
            .ok_or_else(|| DialogError::BadSdp(relay_sip_core::SdpError::MissingField("c".into())))?;
        let remote_rtp_addr = SocketAddr::new(remote_ip, remote_port);

        let (rtp_port, rtcp_port) = self.ports.lock().unwrap().allocate()?;
        let local_rtp_addr = SocketAddr::new(self.config.local_rtp_ip, rtp_port);
        let rtp = RtpEngine::bind(
            local_rtp_addr,
            Some(remote_rtp_addr),
            payload_type,
            self.config.send_queue_capacity,
            self.config.recv_queue_capacity,
            Some(self.control_sink.clone()),
        )
        .await?;

        let sdp_answer = build_sdp_answer(self.config.local_rtp_ip, rtp_port, payload_type);
        let local_tag = gen_tag();
        let cseq = request.cseq().ok_or_else(|| {
            DialogError::BadSdp(relay_sip_core::SdpError::MissingField("CSeq".into()))
        })?;
        let via = request.via().unwrap_or_default().to_string();
        let from_header = request.from_header().unwrap_or_default().to_string();
        let to_header = request.to_header().unwrap_or_default().to_string();
        let branch = extract_branch(&via);

        let response = self.build_ok_response(
            &via,
            &from_header,
            &to_header,
            &local_tag,
            call_id,
            cseq,
            Body::Sdp(sdp_answer),
        );
        self.socket.send_to(&response, src).await?;

        let dialog = Dialog {
            id: dialog_id.clone(),
            direction: Direction::Inbound,
            state: DialogState::Answered,
            local_addr: SocketAddr::new(self.config.local_sip_ip, self.config.local_sip_port),
            remote_addr: src,
            local_tag,
            remote_tag: None,
            local_cseq: cseq.number,
            rtp,
            rtp_port,
            rtcp_port,
            payload_type,
            created_at: Instant::now(),
            answered_at: None,
            terminated_at: None,
            ack_sent: false,
            from_header: from_header.clone(),
            to_header,
            via_header: via,
            retransmission_cache: HashMap::new(),
        };
        {
            let mut dialogs = self.dialogs.lock().unwrap();
            if let Some(branch) = &branch {
                let mut d = dialog;
                d.cache_response(cseq.number, branch, response);
                dialogs.insert(dialog_id, d);
            } else {
                dialogs.insert(dialog_id, dialog);
            }
        }

        let caller = extract_caller_id(&from_header);
        self.emit(format!("RING_ANS:{caller}")).await;
        Ok(())
    }

    async fn handle_ack(&self, call_id: &str) -> Result<()> {
        let dialog_id = DialogId::new(call_id);
        let (rtp, payload_type) = {
            let mut dialogs = self.dialogs.lock().unwrap();
            let Some(dialog) = dialogs.get_mut(&dialog_id) else {
                tracing::warn!("ACK for unknown call {call_id}");
                return Err(DialogError::UnknownDialog(call_id.to_string()));
            };
            if dialog.ack_sent {
                tracing::debug!("duplicate ACK for {call_id}, ignoring");
                return Ok(());
            }
            dialog.ack_sent = true;
            dialog.state = DialogState::Established;
            dialog.answered_at = Some(Instant::now());
            (dialog.rtp.clone(), dialog.payload_type)
        };

        if let Some(greeting) = &self.config.greeting_pcm {
            for frame in greeting.chunks(relay_codec::g711::PCM_BYTES_PER_FRAME) {
                rtp.enqueue_send(payload_type.encode(frame)).await;
            }
        }

        self.media_hook.on_established(&dialog_id, rtp);
        Ok(())
    }

    /// Shared tail of inbound BYE/CANCEL handling. `save_recording` is false
    /// for CANCEL (pre-ESTABLISHED, nothing worth saving) per spec.md §4.5.
    async fn handle_bye(
        &self,
        request: &SipMessage,
        call_id: &str,
        src: SocketAddr,
        save_recording: bool,
    ) -> Result<()> {
        let dialog_id = DialogId::new(call_id);
        let removed = self.dialogs.lock().unwrap().remove(&dialog_id);

        let response = self.build_error_response(request, 200, "OK");
        self.socket.send_to(&response, src).await?;

        let Some(mut dialog) = removed else {
            tracing::warn!("BYE/CANCEL for unknown call {call_id}");
            return Ok(());
        };

        self.ports.lock().unwrap().release(dialog.rtp_port, dialog.rtcp_port);

        if save_recording {
            if let Some(dir) = self.config.recording_dir.clone() {
                let pcm = dialog.rtp.take_recorded_pcm();
                let call_id = call_id.to_string();
                let result = tokio::task::spawn_blocking(move || save_recording_file(&dir, &call_id, &pcm))
                    .await;
                match result {
                    Ok(Err(e)) => tracing::warn!("failed to save recording for {dialog_id}: {e}"),
                    Err(e) => tracing::warn!("recording save task for {dialog_id} panicked: {e}"),
                    Ok(Ok(())) => {}
                }
            }
        }

        dialog.rtp.shutdown();
        dialog.terminated_at = Some(Instant::now());
        self.media_hook.on_terminated(&dialog_id);

        self.emit(if save_recording {
            "BYE".to_string()
        } else {
            "RING_IGNORE".to_string()
        })
        .await;
        Ok(())
    }

    // ---- inbound responses to our outbound requests ------------------------

    async fn handle_response(&self, response: SipMessage, src: SocketAddr) {
        let SipMessage::Response { line, .. } = &response else {
            unreachable!()
        };
        let Some(call_id) = response.call_id().map(str::to_string) else {
            tracing::warn!("response missing Call-ID, dropping");
            return;
        };
        let Some(cseq) = response.cseq() else {
            tracing::warn!("response for {call_id} missing CSeq, dropping");
            return;
        };

        let status = line.status;
        let dialog_id = DialogId::new(&call_id);

        if (100..200).contains(&status) {
            let is_ringing = {
                let mut dialogs = self.dialogs.lock().unwrap();
                match dialogs.get_mut(&dialog_id) {
                    Some(dialog) if status == 180 => {
                        dialog.state = DialogState::Ringing;
                        true
                    }
                    Some(dialog) if status == 183 => {
                        dialog.state = DialogState::Early;
                        false
                    }
                    _ => false,
                }
            };
            if is_ringing {
                self.emit(format!("CALL_IGNORE:{call_id}")).await;
            }
            return;
        }

        if status == 200 && cseq.method == Method::Invite {
            if let Err(e) = self.handle_invite_200(&response, &dialog_id, src).await {
                tracing::warn!("failed to finish establishing {call_id}: {e}");
            }
            return;
        }

        if status == 200 && cseq.method == Method::Bye {
            tracing::debug!("BYE confirmed for {call_id}");
            return;
        }

        if (300..700).contains(&status) && cseq.method == Method::Invite {
            let removed = self.dialogs.lock().unwrap().remove(&dialog_id);
            if let Some(dialog) = removed {
                self.ports.lock().unwrap().release(dialog.rtp_port, dialog.rtcp_port);
                dialog.rtp.shutdown();
            }
            self.emit(format!("CALL_FAILED:{} {}", status, line.reason)).await;
        }
    }

    async fn handle_invite_200(
        &self,
        response: &SipMessage,
        dialog_id: &DialogId,
        src: SocketAddr,
    ) -> Result<()> {
        let already_acked = {
            let dialogs = self.dialogs.lock().unwrap();
            match dialogs.get(dialog_id) {
                Some(d) => d.ack_sent,
                None => return Err(DialogError::UnknownDialog(dialog_id.0.clone())),
            }
        };
        if already_acked {
            tracing::debug!("duplicate 200 OK for {dialog_id}, not re-ACKing");
            return Ok(());
        }

        let remote_sdp = response.body().as_sdp().ok_or_else(|| {
            DialogError::BadSdp(relay_sip_core::SdpError::Empty)
        })?;
        let audio = remote_sdp.first_audio().ok_or(DialogError::CodecUnsupported)?;
        let (_, remote_port, _) = audio.parse_media_line().ok_or(DialogError::CodecUnsupported)?;
        let remote_ip = remote_sdp
            .audio_connection()
            .and_then(parse_connection_ip)
            .ok_or(DialogError::CodecUnsupported)?;

        let (from_header, to_header, next_cseq, rtp) = {
            let mut dialogs = self.dialogs.lock().unwrap();
            let dialog = dialogs
                .get_mut(dialog_id)
                .ok_or_else(|| DialogError::UnknownDialog(dialog_id.0.clone()))?;
            dialog.rtp.set_remote(SocketAddr::new(remote_ip, remote_port));
            dialog.ack_sent = true;
            dialog.state = DialogState::Established;
            dialog.answered_at = Some(Instant::now());
            let cseq = dialog.next_cseq(Method::Ack);
            (
                dialog.from_header.clone(),
                response.to_header().unwrap_or(&dialog.to_header).to_string(),
                cseq,
                dialog.rtp.clone(),
            )
        };

        let ack = self.build_ack(&call_id_of(dialog_id), &from_header, &to_header, next_cseq, src);
        self.socket.send_to(&ack, src).await?;

        self.media_hook.on_established(dialog_id, rtp);
        self.emit("CALL_ANS".to_string()).await;
        Ok(())
    }

    // ---- outbound call origination -----------------------------------------

    /// `CALL:<phone>` (spec.md §4.5, §6): build and send an outbound INVITE.
    pub async fn originate_call(&self, phone: &str) -> Result<String> {
        let (rtp_port, rtcp_port) = self.ports.lock().unwrap().allocate()?;
        let local_rtp_addr = SocketAddr::new(self.config.local_rtp_ip, rtp_port);

        let primary_codec = self.config.preferred_codecs.first().copied().unwrap_or(PayloadType::Pcma);
        let rtp_result = RtpEngine::bind(
            local_rtp_addr,
            None,
            primary_codec,
            self.config.send_queue_capacity,
            self.config.recv_queue_capacity,
            Some(self.control_sink.clone()),
        )
        .await;
        let rtp = match rtp_result {
            Ok(rtp) => rtp,
            Err(e) => {
                self.ports.lock().unwrap().release(rtp_port, rtcp_port);
                return Err(e.into());
            }
        };

        let call_id = format!("{}@{}", uuid::Uuid::new_v4(), self.config.local_sip_ip);
        let local_tag = gen_tag();
        let branch = format!("z9hG4bK-{}", gen_hex(16));
        let sip_server_addr = SocketAddr::new(self.config.sip_server_ip, self.config.sip_server_port);

        let to_uri = format!("sip:{phone}@{}", self.config.sip_server_ip);
        let from_uri = format!(
            "sip:{}:{}",
            self.config.local_sip_ip, self.config.local_sip_port
        );
        let via = format!(
            "SIP/2.0/UDP {}:{};branch={branch}",
            self.config.local_sip_ip, self.config.local_sip_port
        );
        let from_header = format!("<{from_uri}>;tag={local_tag}");
        let to_header = format!("<{to_uri}>");

        let sdp_offer = build_sdp_offer(self.config.local_rtp_ip, rtp_port, &self.config.preferred_codecs);

        let mut headers = HeaderMap::new();
        headers.append("Via", &via);
        headers.append("From", &from_header);
        headers.append("To", &to_header);
        headers.append("Call-ID", &call_id);
        headers.append("CSeq", "1 INVITE");
        headers.append(
            "Contact",
            format!("<sip:{}:{}>", self.config.local_sip_ip, self.config.local_sip_port),
        );
        headers.append("Max-Forwards", "70");
        headers.append("Content-Type", "application/sdp");
        let msg = SipMessage::Request {
            line: RequestLine {
                method: Method::Invite,
                uri: to_uri.clone(),
                version: "SIP/2.0".into(),
            },
            headers,
            body: Body::Sdp(sdp_offer),
        };
        let bytes = serialize_message(&msg);

        if let Err(e) = self.socket.send_to(&bytes, sip_server_addr).await {
            self.ports.lock().unwrap().release(rtp_port, rtcp_port);
            return Err(e.into());
        }

        let dialog_id = DialogId::new(call_id.clone());
        let dialog = Dialog {
            id: dialog_id.clone(),
            direction: Direction::Outbound,
            state: DialogState::Calling,
            local_addr: SocketAddr::new(self.config.local_sip_ip, self.config.local_sip_port),
            remote_addr: sip_server_addr,
            local_tag,
            remote_tag: None,
            local_cseq: 1,
            rtp,
            rtp_port,
            rtcp_port,
            payload_type: primary_codec,
            created_at: Instant::now(),
            answered_at: None,
            terminated_at: None,
            ack_sent: false,
            from_header,
            to_header,
            via_header: via,
            retransmission_cache: HashMap::new(),
        };
        self.dialogs.lock().unwrap().insert(dialog_id.clone(), dialog);
        self.arm_invite_timeout(dialog_id);

        Ok(call_id)
    }

    /// Fail `CALLING → TERMINATED` with `InviteTimeout` if no final response
    /// lands within `invite_timeout` (spec.md §5).
    fn arm_invite_timeout(self: &Arc<Self>, dialog_id: DialogId) {
        let this = self.clone();
        let timeout = this.config.invite_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let removed = {
                let mut dialogs = this.dialogs.lock().unwrap();
                match dialogs.get(&dialog_id) {
                    Some(d) if d.state == DialogState::Calling => dialogs.remove(&dialog_id),
                    _ => None,
                }
            };
            if let Some(dialog) = removed {
                tracing::warn!("INVITE for {dialog_id} timed out after {timeout:?}");
                this.ports.lock().unwrap().release(dialog.rtp_port, dialog.rtcp_port);
                dialog.rtp.shutdown();
                this.emit("CALL_FAILED:408 Request Timeout".to_string()).await;
            }
        });
    }

    /// `HANGUP` (spec.md §4.9): send BYE on the most recently established
    /// dialog.
    pub async fn hangup(&self) -> Result<()> {
        let target = {
            let dialogs = self.dialogs.lock().unwrap();
            dialogs
                .values()
                .filter(|d| d.state == DialogState::Established)
                .max_by_key(|d| d.answered_at)
                .map(|d| d.id.clone())
        };
        let Some(dialog_id) = target else {
            tracing::debug!("HANGUP with no established dialog, ignoring");
            return Ok(());
        };

        let (bye, remote_addr) = {
            let mut dialogs = self.dialogs.lock().unwrap();
            let dialog = dialogs
                .get_mut(&dialog_id)
                .ok_or_else(|| DialogError::UnknownDialog(dialog_id.0.clone()))?;
            dialog.state = DialogState::Terminating;
            let cseq = dialog.next_cseq(Method::Bye);
            let mut headers = HeaderMap::new();
            headers.append("Via", &dialog.via_header);
            headers.append("From", &dialog.from_header);
            headers.append("To", &dialog.to_header);
            headers.append("Call-ID", dialog_id.0.clone());
            headers.append("CSeq", cseq.to_string());
            headers.append("Max-Forwards", "70");
            let msg = SipMessage::Request {
                line: RequestLine {
                    method: Method::Bye,
                    uri: dialog.to_header.clone(),
                    version: "SIP/2.0".into(),
                },
                headers,
                body: Body::Raw(Vec::new()),
            };
            (serialize_message(&msg), dialog.remote_addr)
        };

        self.socket.send_to(&bye, remote_addr).await?;
        Ok(())
    }

    // ---- shared helpers -----------------------------------------------------

    async fn emit(&self, frame: String) {
        self.control_sink.push_drop_oldest(frame);
    }

    fn build_error_response(&self, request: &SipMessage, status: u16, reason: &str) -> Vec<u8> {
        let mut headers = HeaderMap::new();
        if let Some(via) = request.via() {
            headers.append("Via", via);
        }
        if let Some(from) = request.from_header() {
            headers.append("From", from);
        }
        if let Some(to) = request.to_header() {
            headers.append("To", to);
        }
        if let Some(call_id) = request.call_id() {
            headers.append("Call-ID", call_id);
        }
        if let Some(cseq) = request.cseq() {
            headers.append("CSeq", cseq.to_string());
        }
        let msg = SipMessage::Response {
            line: StatusLine {
                version: "SIP/2.0".into(),
                status,
                reason: reason.into(),
            },
            headers,
            body: Body::Raw(Vec::new()),
        };
        serialize_message(&msg)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_ok_response(
        &self,
        via: &str,
        from: &str,
        to: &str,
        local_tag: &str,
        call_id: &str,
        cseq: CSeq,
        body: Body,
    ) -> Vec<u8> {
        let mut headers = HeaderMap::new();
        headers.append("Via", via);
        headers.append("From", from);
        headers.append("To", format!("{to};tag={local_tag}"));
        headers.append("Call-ID", call_id);
        headers.append("CSeq", cseq.to_string());
        headers.append(
            "Contact",
            format!("<sip:{}:{}>", self.config.local_sip_ip, self.config.local_sip_port),
        );
        if matches!(body, Body::Sdp(_)) {
            headers.append("Content-Type", "application/sdp");
        }
        let msg = SipMessage::Response {
            line: StatusLine {
                version: "SIP/2.0".into(),
                status: 200,
                reason: "OK".into(),
            },
            headers,
            body,
        };
        serialize_message(&msg)
    }

    fn build_ack(&self, call_id: &str, from: &str, to: &str, cseq: CSeq, dest: SocketAddr) -> Vec<u8> {
        let mut headers = HeaderMap::new();
        headers.append(
            "Via",
            format!(
                "SIP/2.0/UDP {}:{};branch=z9hG4bK-{}",
                self.config.local_sip_ip,
                self.config.local_sip_port,
                gen_hex(16)
            ),
        );
        headers.append("From", from);
        headers.append("To", to);
        headers.append("Call-ID", call_id);
        headers.append("CSeq", cseq.to_string());
        headers.append("Max-Forwards", "70");
        let msg = SipMessage::Request {
            line: RequestLine {
                method: Method::Ack,
                uri: format!("sip:{}:{}", dest.ip(), dest.port()),
                version: "SIP/2.0".into(),
            },
            headers,
            body: Body::Raw(Vec::new()),
        };
        serialize_message(&msg)
    }
}

fn call_id_of(dialog_id: &DialogId) -> String {
    dialog_id.0.clone()
}

/// The first payload type the offer proposed that we support, PCMA
/// preferred then PCMU (spec.md §4.5).
fn negotiate_codec(offer: &MediaDescription, preferred: &[PayloadType]) -> Option<PayloadType> {
    let (_, _, pts) = offer.parse_media_line()?;
    preferred
        .iter()
        .copied()
        .find(|pt| pts.contains(&(pt.pt_byte() as u16)))
}

fn build_sdp_answer(local_ip: IpAddr, rtp_port: u16, pt: PayloadType) -> SdpMessage {
    let session_id = session_id_token();
    SdpMessage {
        v: "0".into(),
        o: format!("- {session_id} {session_id} IN IP4 {local_ip}"),
        s: "-".into(),
        c: Some(format!("IN IP4 {local_ip}")),
        t: vec!["0 0".into()],
        media: vec![MediaDescription {
            m: format!("audio {rtp_port} RTP/AVP {}", pt.pt_byte()),
            c: None,
            a: vec![format!("rtpmap:{} {}/8000", pt.pt_byte(), pt.codec_name())],
        }],
    }
}

fn build_sdp_offer(local_ip: IpAddr, rtp_port: u16, preferred: &[PayloadType]) -> SdpMessage {
    let session_id = session_id_token();
    let pts: Vec<String> = preferred.iter().map(|pt| pt.pt_byte().to_string()).collect();
    let rtpmaps = preferred
        .iter()
        .map(|pt| format!("rtpmap:{} {}/8000", pt.pt_byte(), pt.codec_name()))
        .collect();
    SdpMessage {
        v: "0".into(),
        o: format!("relay {session_id} {session_id} IN IP4 {local_ip}"),
        s: "Call".into(),
        c: Some(format!("IN IP4 {local_ip}")),
        t: vec!["0 0".into()],
        media: vec![MediaDescription {
            m: format!("audio {rtp_port} RTP/AVP {}", pts.join(" ")),
            c: None,
            a: rtpmaps,
        }],
    }
}

fn session_id_token() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn parse_connection_ip(c_line: &str) -> Option<IpAddr> {
    // "IN IP4 203.0.113.7"
    let mut parts = c_line.split_whitespace();
    let _net_type = parts.next()?;
    let _addr_type = parts.next()?;
    parts.next()?.parse().ok()
}

fn extract_branch(via: &str) -> Option<String> {
    via.split(';')
        .find_map(|param| param.trim().strip_prefix("branch="))
        .map(str::to_string)
}

/// `"0903383638" <sip:0903383638@host>` -> `0903383638` (spec.md §4.5,
/// grounded on `receive_server.py::_handle_invite`'s
/// `from_.split(" ")[0].replace('"', "")`).
fn extract_caller_id(from_header: &str) -> String {
    from_header
        .split_whitespace()
        .next()
        .unwrap_or(from_header)
        .trim_matches('"')
        .to_string()
}

fn gen_tag() -> String {
    format!("{:08x}", rand::random::<u32>())
}

fn gen_hex(chars: usize) -> String {
    let mut s = String::new();
    while s.len() < chars {
        s.push_str(&format!("{:016x}", rand::random::<u64>()));
    }
    s.truncate(chars);
    s
}

fn save_recording_file(dir: &std::path::Path, call_id: &str, pcm: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let short_id: String = call_id.chars().take(8).collect();
    let path: PathBuf = dir.join(format!("{timestamp}_{short_id}.wav"));
    std::fs::write(path, wav::write_wav(pcm))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_branch_parameter() {
        let via = "SIP/2.0/UDP 1.2.3.4:5060;branch=z9hG4bK123";
        assert_eq!(extract_branch(via), Some("z9hG4bK123".to_string()));
    }

    #[test]
    fn extracts_quoted_caller_id() {
        let from = "\"0903383638\" <sip:0903383638@192.168.1.170>;tag=abc";
        assert_eq!(extract_caller_id(from), "0903383638");
    }

    #[test]
    fn negotiates_pcma_over_pcmu_when_offer_has_both() {
        let media = MediaDescription {
            m: "audio 4000 RTP/AVP 0 8 96".into(),
            c: None,
            a: vec![],
        };
        let preferred = [PayloadType::Pcma, PayloadType::Pcmu];
        assert_eq!(negotiate_codec(&media, &preferred), Some(PayloadType::Pcma));
    }

    #[test]
    fn negotiation_fails_when_no_common_codec() {
        let media = MediaDescription {
            m: "audio 4000 RTP/AVP 96".into(),
            c: None,
            a: vec![],
        };
        let preferred = [PayloadType::Pcma, PayloadType::Pcmu];
        assert_eq!(negotiate_codec(&media, &preferred), None);
    }

    #[test]
    fn parses_connection_ip() {
        assert_eq!(
            parse_connection_ip("IN IP4 203.0.113.7"),
            Some("203.0.113.7".parse().unwrap())
        );
    }
}
