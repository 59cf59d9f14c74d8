//! Per-dialog RTP send/receive engine (spec.md §4.3).
//!
//! Grounded on `original_source/helper/rtp_handler.py::RTPHandler`'s
//! single-socket, two-task design, and on the teacher's
//! `UdpTransport`/`UdpListener`/`UdpSender` split in
//! `crates/sip-transport/src/transport/udp` for the `Arc<Inner>` shape and
//! the spawn-a-receive-loop pattern. The fixed 20ms send pacing and the
//! two distinct overflow policies are spec-specific and have no teacher
//! analogue, so they are implemented directly against `tokio`.

use crate::error::Result;
use crate::packet::RtpPacket;
use crate::payload_type::PayloadType;
use crate::queue::AudioQueue;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;

const SEND_QUEUE_TICK: Duration = Duration::from_millis(20);
const SEND_BLOCK_TIMEOUT: Duration = Duration::from_millis(20);
const RECV_TIMEOUT: Duration = Duration::from_secs(1);
const SAMPLES_PER_FRAME: u32 = 160;

/// A point-in-time snapshot of one engine's counters (spec.md §4.3:
/// "total_packets, total_bytes, lost_packets ..., last_sequence").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RtpStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_lost: u64,
    /// Total payload bytes received, across all inbound packets.
    pub total_bytes: u64,
    /// The most recent sequence number received, if any.
    pub last_sequence: Option<u16>,
}

#[derive(Default)]
struct StatsInner {
    sent: AtomicU64,
    received: AtomicU64,
    lost: AtomicU64,
    bytes: AtomicU64,
    last_seq: Mutex<Option<u16>>,
}

impl StatsInner {
    /// Wraparound-aware loss accounting: the gap between the expected next
    /// sequence number and the one that actually arrived, computed with
    /// wrapping arithmetic so a 65535 -> 0 rollover reports zero loss.
    fn record_receive(&self, seq: u16, payload_len: usize) {
        let mut last = self.last_seq.lock().unwrap();
        if let Some(prev) = *last {
            let expected = prev.wrapping_add(1);
            if seq != expected {
                let gap = seq.wrapping_sub(expected) as u64;
                self.lost.fetch_add(gap, Ordering::Relaxed);
            }
        }
        *last = Some(seq);
        drop(last);
        self.received.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(payload_len as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RtpStats {
        RtpStats {
            packets_sent: self.sent.load(Ordering::Relaxed),
            packets_received: self.received.load(Ordering::Relaxed),
            packets_lost: self.lost.load(Ordering::Relaxed),
            total_bytes: self.bytes.load(Ordering::Relaxed),
            last_sequence: *self.last_seq.lock().unwrap(),
        }
    }
}

struct Inner {
    socket: UdpSocket,
    ssrc: u32,
    payload_type: PayloadType,
    remote_addr: Mutex<Option<SocketAddr>>,
    paused: std::sync::atomic::AtomicBool,
    sequence: AtomicU16,
    timestamp: AtomicU32,
    send_queue: AudioQueue<Vec<u8>>,
    recv_queue: AudioQueue<RtpPacket>,
    stats: StatsInner,
    control_sink: Option<Arc<AudioQueue<String>>>,
    /// Linearized PCM accumulated from every inbound payload, for the WAV
    /// recording the Dialog Manager saves on BYE (spec.md §4.3, §6).
    recorded_pcm: Mutex<Vec<u8>>,
}

/// Handle to a running RTP engine. Cloning shares the same underlying
/// socket and queues.
#[derive(Clone)]
pub struct RtpEngine {
    inner: Arc<Inner>,
    shutdown_tx: watch::Sender<bool>,
}

impl RtpEngine {
    /// Bind a UDP socket and start the sender/receiver tasks. `control_sink`
    /// is the "sink callback" fix for the global-singleton anti-pattern
    /// (spec.md §9): the engine emits `RTP:<pt>##<hex>` frames to it without
    /// knowing anything about the control channel. It is a drop-oldest
    /// bounded queue (spec.md §4.7), so a mirror-frame producer never blocks
    /// or waits on a slow/absent operator UI.
    pub async fn bind(
        local_addr: SocketAddr,
        remote_addr: Option<SocketAddr>,
        payload_type: PayloadType,
        send_queue_capacity: usize,
        recv_queue_capacity: usize,
        control_sink: Option<Arc<AudioQueue<String>>>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(local_addr).await?;
        let ssrc: u32 = rand::random();

        let inner = Arc::new(Inner {
            socket,
            ssrc,
            payload_type,
            remote_addr: Mutex::new(remote_addr),
            paused: std::sync::atomic::AtomicBool::new(false),
            sequence: AtomicU16::new(rand::random()),
            timestamp: AtomicU32::new(0),
            send_queue: AudioQueue::new(send_queue_capacity),
            recv_queue: AudioQueue::new(recv_queue_capacity),
            stats: StatsInner::default(),
            control_sink,
            recorded_pcm: Mutex::new(Vec::new()),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sender_loop(inner.clone(), shutdown_rx.clone()));
        tokio::spawn(receiver_loop(inner.clone(), shutdown_rx));

        Ok(RtpEngine { inner, shutdown_tx })
    }

    pub fn ssrc(&self) -> u32 {
        self.inner.ssrc
    }

    pub fn set_remote(&self, addr: SocketAddr) {
        *self.inner.remote_addr.lock().unwrap() = Some(addr);
    }

    pub fn remote(&self) -> Option<SocketAddr> {
        *self.inner.remote_addr.lock().unwrap()
    }

    /// Queue one pre-encoded payload for transmission. Blocks briefly and
    /// drops on a persistently full queue (spec.md §4.3).
    pub async fn enqueue_send(&self, payload: Vec<u8>) {
        if !self.inner.send_queue.push_block_timeout(payload, SEND_BLOCK_TIMEOUT).await {
            tracing::warn!("rtp send queue full, dropping outbound frame");
        }
    }

    /// Receive the next inbound packet, or `None` once the engine has shut
    /// down and its receive queue has drained.
    pub async fn recv(&self) -> Option<RtpPacket> {
        self.inner.recv_queue.pop().await
    }

    /// Pause transmission and drain any queued outbound audio (barge-in,
    /// spec.md §4.3/§4.8).
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::Relaxed);
        self.inner.send_queue.drain();
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> RtpStats {
        self.inner.stats.snapshot()
    }

    pub fn payload_type(&self) -> PayloadType {
        self.inner.payload_type
    }

    /// Take the linear PCM accumulated from inbound payloads since the last
    /// call, leaving the buffer empty. Used to build the call recording
    /// when a Dialog ends (spec.md §6).
    pub fn take_recorded_pcm(&self) -> Vec<u8> {
        std::mem::take(&mut self.inner.recorded_pcm.lock().unwrap())
    }

    /// Signal both tasks to stop and close the queues.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        self.inner.send_queue.close();
        self.inner.recv_queue.close();
    }
}

async fn sender_loop(inner: Arc<Inner>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(SEND_QUEUE_TICK);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if *shutdown_rx.borrow() {
                    break;
                }
                let remote = *inner.remote_addr.lock().unwrap();
                let Some(remote) = remote else { continue };

                let paused = inner.paused.load(Ordering::Relaxed);
                let payload = if paused {
                    inner.payload_type.silence_frame()
                } else {
                    inner.send_queue.try_pop().unwrap_or_else(|| inner.payload_type.silence_frame())
                };

                let seq = inner.sequence.fetch_add(1, Ordering::Relaxed);
                let ts = inner.timestamp.fetch_add(SAMPLES_PER_FRAME, Ordering::Relaxed);
                let packet = RtpPacket::new(inner.payload_type.pt_byte(), seq, ts, inner.ssrc, payload);

                match inner.socket.send_to(&packet.pack(), remote).await {
                    Ok(_) => {
                        inner.stats.sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => tracing::warn!("rtp send_to {remote} failed: {e}"),
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

async fn receiver_loop(inner: Arc<Inner>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut buf = [0u8; 2048];
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            res = tokio::time::timeout(RECV_TIMEOUT, inner.socket.recv_from(&mut buf)) => {
                match res {
                    Ok(Ok((n, _src))) => handle_inbound(&inner, &buf[..n]),
                    Ok(Err(e)) => tracing::warn!("rtp recv_from error: {e}"),
                    Err(_elapsed) => {} // 1s timeout; loop back to recheck shutdown
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

fn handle_inbound(inner: &Arc<Inner>, datagram: &[u8]) {
    let packet = match RtpPacket::unpack(datagram) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("dropping malformed RTP packet: {e}");
            return;
        }
    };

    inner.stats.record_receive(packet.sequence, packet.payload.len());

    let pcm = inner.payload_type.decode(&packet.payload);
    inner.recorded_pcm.lock().unwrap().extend_from_slice(&pcm);

    if let Some(sink) = &inner.control_sink {
        let frame = format!(
            "RTP:{}##{}",
            packet.payload_type,
            to_lower_hex(&packet.payload)
        );
        sink.push_drop_oldest(frame);
    }

    inner.recv_queue.push_drop_oldest(packet);
}

fn to_lower_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_counter_is_zero_across_sequence_wraparound() {
        let stats = StatsInner::default();
        stats.record_receive(65534, 160);
        stats.record_receive(65535, 160);
        stats.record_receive(0, 160);
        let snap = stats.snapshot();
        assert_eq!(snap.packets_lost, 0);
        assert_eq!(snap.last_sequence, Some(0));
        assert_eq!(snap.total_bytes, 480);
    }

    #[test]
    fn loss_counter_counts_the_gap() {
        let stats = StatsInner::default();
        stats.record_receive(10, 160);
        stats.record_receive(15, 160);
        assert_eq!(stats.snapshot().packets_lost, 4);
    }

    #[test]
    fn hex_encoding_is_lowercase() {
        assert_eq!(to_lower_hex(&[0xAB, 0x0F]), "ab0f");
    }

    #[tokio::test]
    async fn pause_drains_the_send_queue() {
        let engine = RtpEngine::bind(
            "127.0.0.1:0".parse().unwrap(),
            None,
            PayloadType::Pcma,
            10,
            10,
            None,
        )
        .await
        .unwrap();
        engine.enqueue_send(vec![1, 2, 3]).await;
        assert!(!engine.inner.send_queue.is_empty());
        engine.pause();
        assert!(engine.inner.send_queue.is_empty());
        engine.shutdown();
    }

    #[tokio::test]
    async fn inbound_payloads_accumulate_as_linear_pcm() {
        let engine = RtpEngine::bind(
            "127.0.0.1:0".parse().unwrap(),
            None,
            PayloadType::Pcma,
            10,
            10,
            None,
        )
        .await
        .unwrap();
        let packet = RtpPacket::new(8, 1, 160, engine.ssrc(), PayloadType::Pcma.silence_frame());
        handle_inbound(&engine.inner, &packet.pack());
        let pcm = engine.take_recorded_pcm();
        assert_eq!(pcm.len(), 320);
        assert!(engine.take_recorded_pcm().is_empty());
        engine.shutdown();
    }
}
