//! End-to-end dialog-manager scenarios driven over a real loopback UDP
//! socket, standing in for the SIP peer `DialogManager` talks to. These
//! cover spec.md §8's S1 (inbound happy path), S2 (duplicate ACK), S4 (BYE
//! after established), and S5 (outbound INVITE failure) scenarios, per
//! SPEC_FULL.md §8's test-placement note.

use relay_dialog::{DialogId, DialogManager, DialogManagerConfig, MediaBridgeHook};
use relay_rtp::{AudioQueue, RtpEngine};
use relay_sip_core::{parse_message, Body, SipMessage};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

/// Counts established/terminated calls instead of spawning a real Media
/// Bridge, so these tests exercise only the dialog/SIP/RTP layer.
#[derive(Default)]
struct CountingHook {
    established: AtomicUsize,
    terminated: AtomicUsize,
}

impl MediaBridgeHook for CountingHook {
    fn on_established(&self, _dialog_id: &DialogId, _rtp: RtpEngine) {
        self.established.fetch_add(1, Ordering::SeqCst);
    }
    fn on_terminated(&self, _dialog_id: &DialogId) {
        self.terminated.fetch_add(1, Ordering::SeqCst);
    }
}

async fn spawn_manager() -> (Arc<DialogManager>, Arc<CountingHook>, Arc<AudioQueue<String>>) {
    let mut config = DialogManagerConfig::default();
    config.local_sip_ip = "127.0.0.1".parse().unwrap();
    config.local_sip_port = 0;
    config.rtp_port_range = (31100, 31200);

    let control_queue = Arc::new(AudioQueue::new(100));
    let hook = Arc::new(CountingHook::default());
    let manager = DialogManager::bind(config, control_queue.clone(), hook.clone())
        .await
        .unwrap();
    tokio::spawn(manager.clone().run());
    (manager, hook, control_queue)
}

/// Builds an INVITE whose SDP offer targets a decoy RTP port distinct from
/// `peer_addr`'s own port: the RTP engine starts sending silence frames to
/// that address as soon as the offer is accepted, and those packets must
/// not land on (and be misread as SIP responses by) the signalling socket
/// these tests use as the simulated peer.
fn invite_datagram(call_id: &str, branch: &str, peer_addr: SocketAddr, local_sip_addr: SocketAddr) -> String {
    let decoy_rtp_port = peer_addr.port().wrapping_add(1).max(1);
    format!(
        "INVITE sip:{local_ip}:{local_port} SIP/2.0\r\n\
         Via: SIP/2.0/UDP {peer_ip}:{peer_port};branch={branch}\r\n\
         Max-Forwards: 70\r\n\
         From: \"0903383638\" <sip:0903383638@{peer_ip}>;tag=peertag\r\n\
         To: <sip:{local_ip}:{local_port}>\r\n\
         Call-ID: {call_id}\r\n\
         CSeq: 1 INVITE\r\n\
         Content-Type: application/sdp\r\n\
         Content-Length: 999\r\n\r\n\
         v=0\r\no=- 1 1 IN IP4 {peer_ip}\r\ns=-\r\nc=IN IP4 {peer_ip}\r\nt=0 0\r\n\
         m=audio {decoy_rtp_port} RTP/AVP 0 8 96\r\na=rtpmap:0 PCMU/8000\r\na=rtpmap:8 PCMA/8000\r\n",
        local_ip = local_sip_addr.ip(),
        local_port = local_sip_addr.port(),
        peer_ip = peer_addr.ip(),
        peer_port = peer_addr.port(),
        branch = branch,
        call_id = call_id,
    )
}

async fn recv_response(peer: &UdpSocket) -> SipMessage {
    let mut buf = [0u8; 4096];
    let (n, _) = tokio::time::timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
        .await
        .expect("response within 2s")
        .unwrap();
    parse_message(&String::from_utf8_lossy(&buf[..n])).unwrap()
}

/// S1: inbound INVITE with a PCMU/PCMA offer gets a 200 OK answering PCMA
/// (preferred), and a `RING_ANS:<caller>` control frame.
#[tokio::test]
async fn s1_inbound_call_happy_path() {
    let (manager, _hook, control_queue) = spawn_manager().await;
    let local_addr = manager.local_addr().unwrap();

    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer_addr = peer.local_addr().unwrap();

    let call_id = "s1-call-id";
    let datagram = invite_datagram(call_id, "z9hG4bK-s1", peer_addr, local_addr);
    peer.send_to(datagram.as_bytes(), local_addr).await.unwrap();

    let response = recv_response(&peer).await;
    match &response {
        SipMessage::Response { line, body, .. } => {
            assert_eq!(line.status, 200);
            let sdp = body.as_sdp().expect("200 OK to an SDP offer carries an SDP answer");
            let (_, _, pts) = sdp.media[0].parse_media_line().unwrap();
            assert_eq!(pts, vec![8], "PCMA is preferred over PCMU");
        }
        SipMessage::Request { .. } => panic!("expected a response"),
    }

    let event = tokio::time::timeout(Duration::from_secs(1), control_queue.pop())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, "RING_ANS:0903383638");
    assert_eq!(manager.dialog_count(), 1);
}

/// S2: a retransmitted 200 OK (peer re-sends ACK... no -- peer re-sends the
/// *INVITE* here is not it; this scenario is "peer retransmits 200 OK" on
/// the outbound side, but the inbound analogue spec.md calls out directly
/// is duplicate ACK: a second ACK for the same Call-ID must not re-arm the
/// Media Bridge.
#[tokio::test]
async fn s2_duplicate_ack_does_not_rearm_the_bridge() {
    let (manager, hook, _control_queue) = spawn_manager().await;
    let local_addr = manager.local_addr().unwrap();

    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer_addr = peer.local_addr().unwrap();
    let call_id = "s2-call-id";

    peer.send_to(
        invite_datagram(call_id, "z9hG4bK-s2", peer_addr, local_addr).as_bytes(),
        local_addr,
    )
    .await
    .unwrap();
    let _200ok = recv_response(&peer).await;

    let ack = format!(
        "ACK sip:{ip}:{port} SIP/2.0\r\nVia: SIP/2.0/UDP {peer_ip}:{peer_port};branch=z9hG4bK-s2ack\r\n\
         From: <sip:x@{peer_ip}>;tag=peertag\r\nTo: <sip:{ip}:{port}>\r\nCall-ID: {call_id}\r\n\
         CSeq: 1 ACK\r\nMax-Forwards: 70\r\n\r\n",
        ip = local_addr.ip(),
        port = local_addr.port(),
        peer_ip = peer_addr.ip(),
        peer_port = peer_addr.port(),
        call_id = call_id,
    );
    peer.send_to(ack.as_bytes(), local_addr).await.unwrap();
    peer.send_to(ack.as_bytes(), local_addr).await.unwrap();

    // Give both ACKs time to be handled.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        hook.established.load(Ordering::SeqCst),
        1,
        "duplicate ACK must not re-arm the Media Bridge"
    );
}

/// S4: a BYE on an established dialog gets a 200 OK, a `BYE` control frame,
/// and removes the dialog.
#[tokio::test]
async fn s4_bye_after_established_ends_the_dialog() {
    let (manager, _hook, control_queue) = spawn_manager().await;
    let local_addr = manager.local_addr().unwrap();

    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer_addr = peer.local_addr().unwrap();
    let call_id = "s4-call-id";

    peer.send_to(
        invite_datagram(call_id, "z9hG4bK-s4", peer_addr, local_addr).as_bytes(),
        local_addr,
    )
    .await
    .unwrap();
    let _200ok = recv_response(&peer).await;
    while let Ok(Some(frame)) =
        tokio::time::timeout(Duration::from_millis(200), control_queue.pop()).await
    {
        if frame == "RING_ANS:0903383638" {
            break;
        }
    }

    let bye = format!(
        "BYE sip:{ip}:{port} SIP/2.0\r\nVia: SIP/2.0/UDP {peer_ip}:{peer_port};branch=z9hG4bK-s4bye\r\n\
         From: <sip:x@{peer_ip}>;tag=peertag\r\nTo: <sip:{ip}:{port}>\r\nCall-ID: {call_id}\r\n\
         CSeq: 2 BYE\r\nMax-Forwards: 70\r\n\r\n",
        ip = local_addr.ip(),
        port = local_addr.port(),
        peer_ip = peer_addr.ip(),
        peer_port = peer_addr.port(),
        call_id = call_id,
    );
    peer.send_to(bye.as_bytes(), local_addr).await.unwrap();

    let response = recv_response(&peer).await;
    match response {
        SipMessage::Response { line, .. } => assert_eq!(line.status, 200),
        SipMessage::Request { .. } => panic!("expected a response to BYE"),
    }

    let event = tokio::time::timeout(Duration::from_secs(1), control_queue.pop())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, "BYE");
    assert_eq!(manager.dialog_count(), 0);
}

/// S5: an outbound INVITE answered with `486 Busy Here` emits
/// `CALL_FAILED:486 Busy Here` and leaves the dialog table at its prior
/// size (the dialog is removed, its ports released).
#[tokio::test]
async fn s5_outbound_call_failure_emits_call_failed_and_cleans_up() {
    let (manager, _hook, control_queue) = spawn_manager().await;

    // originate_call sends the INVITE to `sip_server_ip:sip_server_port`,
    // which we point at a throwaway peer socket bound ahead of time.
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer_addr = peer.local_addr().unwrap();

    // Re-bind a manager whose configured SIP server is our test peer.
    let mut config = DialogManagerConfig::default();
    config.local_sip_ip = "127.0.0.1".parse().unwrap();
    config.local_sip_port = 0;
    config.rtp_port_range = (31300, 31320);
    config.sip_server_ip = peer_addr.ip();
    config.sip_server_port = peer_addr.port();
    let control_queue2 = Arc::new(AudioQueue::new(100));
    let hook = Arc::new(CountingHook::default());
    let manager2 = DialogManager::bind(config, control_queue2.clone(), hook).await.unwrap();
    tokio::spawn(manager2.clone().run());
    drop(manager);
    drop(control_queue);

    assert_eq!(manager2.dialog_count(), 0);
    let call_id = manager2.originate_call("18005551234").await.unwrap();
    assert_eq!(manager2.dialog_count(), 1);

    let mut buf = [0u8; 4096];
    let (n, src) = tokio::time::timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let invite = parse_message(&String::from_utf8_lossy(&buf[..n])).unwrap();
    assert_eq!(invite.call_id(), Some(call_id.as_str()));

    let busy = format!(
        "SIP/2.0 486 Busy Here\r\nVia: {via}\r\nFrom: {from}\r\nTo: {to};tag=peertag\r\n\
         Call-ID: {call_id}\r\nCSeq: 1 INVITE\r\n\r\n",
        via = invite.via().unwrap(),
        from = invite.from_header().unwrap(),
        to = invite.to_header().unwrap(),
        call_id = call_id,
    );
    peer.send_to(busy.as_bytes(), src).await.unwrap();
    let _ = matches!(invite.body(), Body::Sdp(_) | Body::Raw(_));

    let event = tokio::time::timeout(Duration::from_secs(1), control_queue2.pop())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, "CALL_FAILED:486 Busy Here");
    assert_eq!(manager2.dialog_count(), 0);
}
