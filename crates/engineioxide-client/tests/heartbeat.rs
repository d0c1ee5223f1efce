use std::time::Duration;

use engineioxide_client::{CloseReason, ProtocolVersion, SocketState};
use tokio::time::{Instant, sleep};

use fixture::{Event, config, connect, handshake, v3_payload};

#[tokio::test(start_paused = true)]
async fn heartbeat_timeout() {
    let (socket, mut server, _ws, mut events) = connect(config().build());
    let (_, res) = server.get().await;
    res.send(&handshake(&[], 300, 200));
    assert_eq!(events.recv().await, Some(Event::Open));
    let start = Instant::now();

    // The server never answers the poll request
    let _poll = server.get().await;
    assert_eq!(
        events.recv().await,
        Some(Event::Error("heartbeat timeout".into()))
    );
    assert_eq!(
        events.recv().await,
        Some(Event::Close(CloseReason::HeartbeatTimeout))
    );
    assert!(start.elapsed() >= Duration::from_millis(500));
    assert_eq!(socket.state(), SocketState::Closed);
}

#[tokio::test(start_paused = true)]
async fn server_ping_resets_heartbeat() {
    let (socket, mut server, _ws, mut events) = connect(config().build());
    let (_, res) = server.get().await;
    res.send(&handshake(&[], 300, 200));
    assert_eq!(events.recv().await, Some(Event::Open));

    let (_, poll) = server.get().await;
    sleep(Duration::from_millis(400)).await;
    poll.send("2");
    assert_eq!(events.recv().await, Some(Event::Ping));
    let (body, res) = server.post().await;
    assert_eq!(body, "3");
    res.send("ok");

    let _poll = server.get().await;
    sleep(Duration::from_millis(400)).await;
    assert_eq!(socket.state(), SocketState::Open);

    assert_eq!(
        events.recv().await,
        Some(Event::Error("heartbeat timeout".into()))
    );
    assert_eq!(
        events.recv().await,
        Some(Event::Close(CloseReason::HeartbeatTimeout))
    );
}

#[tokio::test(start_paused = true)]
async fn v3_client_ping() {
    let (socket, mut server, _ws, mut events) =
        connect(config().protocol(ProtocolVersion::V3).build());
    let (uri, res) = server.get().await;
    assert_eq!(uri, "http://localhost/engine.io/?EIO=3&transport=polling");
    res.send(&v3_payload(&[&handshake(&[], 1000, 500)]));
    assert_eq!(events.recv().await, Some(Event::Open));
    let start = Instant::now();

    let (_, poll) = server.get().await;
    let (body, res) = server.post().await;
    assert!(start.elapsed() >= Duration::from_millis(1000));
    assert_eq!(body, "1:2");
    res.send("ok");

    poll.send("1:3");
    assert_eq!(events.recv().await, Some(Event::Pong));
    assert_eq!(socket.state(), SocketState::Open);

    let _poll = server.get().await;
    socket.close();
    let (body, res) = server.post().await;
    assert_eq!(body, "1:1");
    res.send("ok");
    assert_eq!(
        events.recv().await,
        Some(Event::Close(CloseReason::ForcedClose))
    );
}

#[tokio::test(start_paused = true)]
async fn v3_missing_pong() {
    let (_socket, mut server, _ws, mut events) =
        connect(config().protocol(ProtocolVersion::V3).build());
    let (_, res) = server.get().await;
    res.send(&v3_payload(&[&handshake(&[], 1000, 500)]));
    assert_eq!(events.recv().await, Some(Event::Open));
    let start = Instant::now();

    let _poll = server.get().await;
    let (body, res) = server.post().await;
    assert_eq!(body, "1:2");
    res.send("ok");

    // The ping was sent after the ping interval, the pong is expected within the ping timeout
    assert_eq!(
        events.recv().await,
        Some(Event::Error("heartbeat timeout".into()))
    );
    assert!(start.elapsed() >= Duration::from_millis(1500));
    assert_eq!(
        events.recv().await,
        Some(Event::Close(CloseReason::HeartbeatTimeout))
    );
}
