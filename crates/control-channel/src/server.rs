//! The WebSocket control channel server: exactly one active peer at a time,
//! a bounded inbound queue of parsed commands, and a bounded outbound queue
//! of text frames (spec.md §4.7).
//!
//! Grounded on `original_source/helper/ws_server.py::WebSocketServer`'s
//! accept-loop/single-client-set shape (narrowed here to exactly one active
//! client, per spec.md §4.7: "subsequent connections replace the prior
//! one") and on the teacher's `UdpTransport::spawn_receive_loop` task-per-
//! connection pattern (`crates/sip-transport/src/transport/udp/mod.rs`).

use crate::command::ControlFrame;
use crate::config::ControlChannelConfig;
use crate::error::{ControlError, Result};
use futures_util::{SinkExt, StreamExt};
use relay_rtp::AudioQueue;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type WsSink = futures_util::stream::SplitSink<WebSocketStream<TcpStream>, Message>;

struct CurrentPeer {
    generation: u64,
    recv_task: JoinHandle<()>,
}

/// A process-wide singleton (spec.md §3: "The Control Channel is a
/// process-wide singleton"). Holds the single active peer's outbound sink
/// and the shared inbound/outbound queues. Both queues are drop-oldest
/// bounded at 1000 (spec.md §4.7): a burst of traffic loses the stalest
/// frames rather than blocking a producer or the newest event.
pub struct ControlChannel {
    config: ControlChannelConfig,
    inbound: Arc<AudioQueue<ControlFrame>>,
    inbound_taken: AtomicBool,
    outbound: Arc<AudioQueue<String>>,
    current_sink: Arc<Mutex<Option<WsSink>>>,
    current_peer: Arc<Mutex<Option<CurrentPeer>>>,
    next_generation: AtomicU64,
}

impl ControlChannel {
    pub fn new(config: ControlChannelConfig) -> Arc<Self> {
        let inbound = Arc::new(AudioQueue::new(config.inbound_capacity));
        let outbound = Arc::new(AudioQueue::new(config.outbound_capacity));
        Arc::new(ControlChannel {
            config,
            inbound,
            inbound_taken: AtomicBool::new(false),
            outbound,
            current_sink: Arc::new(Mutex::new(None)),
            current_peer: Arc::new(Mutex::new(None)),
            next_generation: AtomicU64::new(0),
        })
    }

    /// The sink callback handed to `relay-dialog`/`relay-rtp` at dialog
    /// creation time (spec.md §9's fix for the global-singleton
    /// anti-pattern: collaborators only ever see the drop-oldest queue,
    /// never this type).
    pub fn sink(&self) -> Arc<AudioQueue<String>> {
        self.outbound.clone()
    }

    /// Take ownership of the inbound command queue. Call once, typically
    /// from the Call Supervisor.
    pub async fn take_inbound(&self) -> Option<Arc<AudioQueue<ControlFrame>>> {
        if self.inbound_taken.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(self.inbound.clone())
        }
    }

    /// Bind the listener and drive the accept loop and the outbound pump
    /// until `shutdown` fires. Two tasks run permanently: the accept loop
    /// (this future) and the outbound pump, spawned internally; each
    /// connection additionally gets its own receive task for as long as it
    /// is the active peer.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        tokio::spawn(outbound_pump(self.current_sink.clone(), self.outbound.clone()));

        let addr = SocketAddr::new(self.config.host, self.config.port);
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("control channel listening on {addr}");

        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!("control channel accept error: {e}");
                    continue;
                }
            };
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(e) = this.accept_peer(stream, peer_addr).await {
                    tracing::warn!("control channel handshake with {peer_addr} failed: {e}");
                }
            });
        }
    }

    /// Upgrade one TCP connection to WebSocket and make it the active peer,
    /// evicting whichever connection held that role before it.
    async fn accept_peer(&self, stream: TcpStream, peer_addr: SocketAddr) -> Result<()> {
        let ws = tokio_tungstenite::accept_async(stream).await?;
        let (sink, stream) = ws.split();

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        tracing::info!("control channel: {peer_addr} is now the active peer (gen {generation})");

        {
            let mut current = self.current_peer.lock().await;
            if let Some(previous) = current.take() {
                previous.recv_task.abort();
            }
            *self.current_sink.lock().await = Some(sink);

            let inbound = self.inbound.clone();
            let current_sink = self.current_sink.clone();
            let current_peer = self.current_peer.clone();
            let recv_task = tokio::spawn(recv_loop(stream, inbound, current_sink, current_peer, generation));
            *current = Some(CurrentPeer {
                generation,
                recv_task,
            });
        }
        Ok(())
    }
}

/// One connection's receive loop: parse each text frame and publish it to
/// the shared inbound queue. Malformed frames are logged and dropped
/// without closing the connection (spec.md §6, §8 S6).
async fn recv_loop(
    mut stream: futures_util::stream::SplitStream<WebSocketStream<TcpStream>>,
    inbound: Arc<AudioQueue<ControlFrame>>,
    current_sink: Arc<Mutex<Option<WsSink>>>,
    current_peer: Arc<Mutex<Option<CurrentPeer>>>,
    generation: u64,
) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match ControlFrame::parse(&text) {
                Ok(frame) => {
                    inbound.push_drop_oldest(frame);
                }
                Err(ControlError::Protocol(reason)) => {
                    tracing::warn!("rejecting malformed control frame {text:?}: {reason}");
                }
                Err(e) => tracing::warn!("control frame parse error: {e}"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {} // binary/ping/pong frames are not part of this protocol
            Err(e) => {
                tracing::warn!("control channel read error: {e}");
                break;
            }
        }
    }
    // Only clear the shared sink if this connection is still the active
    // peer; a stale task whose generation was already superseded (and whose
    // abort() raced with its own natural stream-end) must not tear down the
    // peer that replaced it.
    let still_current = matches!(&*current_peer.lock().await, Some(p) if p.generation == generation);
    if still_current {
        tracing::debug!("control channel peer (gen {generation}) disconnected");
        *current_sink.lock().await = None;
    }
}

/// The single long-lived task that drains the outbound queue into whichever
/// connection is currently active, dropping frames on the floor when no
/// peer is connected (spec.md §4.7).
async fn outbound_pump(current_sink: Arc<Mutex<Option<WsSink>>>, outbound: Arc<AudioQueue<String>>) {
    while let Some(frame) = outbound.pop().await {
        let mut guard = current_sink.lock().await;
        match guard.as_mut() {
            Some(sink) => {
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    tracing::warn!("control channel send failed, dropping peer: {e}");
                    *guard = None;
                }
            }
            None => tracing::debug!("no control channel peer connected, dropping outbound frame"),
        }
    }
}
