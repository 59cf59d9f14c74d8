//! End-to-end control channel scenarios driven over a real WebSocket
//! connection, covering spec.md §8's S6 (malformed frame doesn't close the
//! connection) and the single-active-peer replacement rule of §4.7, per
//! SPEC_FULL.md §8's test-placement note.

use futures_util::{SinkExt, StreamExt};
use relay_control::{AudioQueue, ControlChannel, ControlChannelConfig, ControlCommand};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

async fn spawn_server() -> (std::net::SocketAddr, Arc<ControlChannel>, Arc<AudioQueue<relay_control::ControlFrame>>) {
    // Pick a free port up front (`ControlChannel::run` binds internally and
    // has no way to report back an OS-chosen ephemeral port).
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let mut config = ControlChannelConfig::default();
    config.host = addr.ip();
    config.port = addr.port();
    let channel = ControlChannel::new(config);
    let inbound = channel.take_inbound().await.unwrap();
    tokio::spawn(channel.clone().run());
    // Give the accept loop a moment to bind before the first client connects.
    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, channel, inbound)
}

/// S6: a malformed frame is logged and dropped; the connection stays open
/// and a subsequent valid command is still delivered.
#[tokio::test]
async fn s6_malformed_frame_does_not_close_the_connection() {
    let (addr, _channel, inbound) = spawn_server().await;
    let url = format!("ws://{addr}");
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    ws.send(Message::Text("NONSENSE".to_string())).await.unwrap();
    ws.send(Message::Text("CALL:0987654321".to_string()))
        .await
        .unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(2), inbound.pop())
        .await
        .expect("the connection must still be open for the valid frame to arrive")
        .unwrap();
    assert_eq!(frame.command, ControlCommand::Call);
    assert_eq!(frame.content.as_deref(), Some("0987654321"));
}

/// §4.7: a second connection replaces the first as the active peer; the
/// first connection's frames are no longer delivered once it has been
/// superseded but the second's are.
#[tokio::test]
async fn second_connection_replaces_the_first_as_active_peer() {
    let (addr, _channel, inbound) = spawn_server().await;
    let url = format!("ws://{addr}");

    let (mut first, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    first.send(Message::Text("HANGUP".to_string())).await.unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(2), inbound.pop())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame.command, ControlCommand::Hangup);

    let (mut second, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    second.send(Message::Text("BYE".to_string())).await.unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(2), inbound.pop())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame.command, ControlCommand::Bye);
}
