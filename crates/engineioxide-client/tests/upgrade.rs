use std::time::Duration;

use engineioxide_client::{CloseReason, SocketState, TransportType};
use futures_util::{SinkExt, StreamExt};
use tokio::io::DuplexStream;
use tokio_tungstenite::{WebSocketStream, tungstenite::Message};

use fixture::{Event, Server, config, connect, drain, handshake};

fn text(data: &str) -> Message {
    Message::text(data.to_string())
}

/// Answer every poll with a noop until the next websocket frame.
/// A poll completing before the pause command reaches the polling transport re-arms the poll loop.
async fn answer_polls_until_upgrade(
    server: &mut Server,
    ws: &mut WebSocketStream<DuplexStream>,
) -> Message {
    loop {
        tokio::select! {
            (_, poll) = server.get() => poll.send("6"),
            msg = ws.next() => break msg.unwrap().unwrap(),
        }
    }
}

#[tokio::test]
async fn websocket_upgrade() {
    let (socket, mut server, mut ws_conns, mut events) = connect(config().build());
    let (_, res) = server.get().await;
    res.send(&handshake(&["websocket"], 25000, 20000));
    assert_eq!(events.recv().await, Some(Event::Open));
    assert_eq!(socket.transport_type(), TransportType::Polling);

    socket.emit("m1").unwrap();
    let (body, res) = server.post().await;
    assert_eq!(body, "4m1");
    res.send("ok");

    let (url, mut ws) = ws_conns.recv().await.unwrap();
    assert_eq!(
        url,
        "ws://localhost/engine.io/?EIO=4&transport=websocket&sid=abc"
    );
    assert_eq!(ws.next().await.unwrap().unwrap(), text("2probe"));
    ws.send(text("3probe")).await.unwrap();

    // The polling transport pauses once its poll request completes
    let upgrade = answer_polls_until_upgrade(&mut server, &mut ws).await;
    assert_eq!(upgrade, text("5"));
    assert_eq!(
        events.recv().await,
        Some(Event::Upgrade(TransportType::Websocket))
    );
    assert_eq!(socket.transport_type(), TransportType::Websocket);

    socket.emit("m2").unwrap();
    assert_eq!(ws.next().await.unwrap().unwrap(), text("4m2"));
    ws.send(text("4world")).await.unwrap();
    assert_eq!(events.recv().await, Some(Event::Message("world".into())));
    ws.send(Message::binary(vec![1, 2, 3])).await.unwrap();
    assert_eq!(
        events.recv().await,
        Some(Event::Binary(vec![1, 2, 3].into()))
    );

    socket.close();
    assert!(matches!(ws.next().await, Some(Ok(Message::Close(_)))));
    assert_eq!(
        events.recv().await,
        Some(Event::Close(CloseReason::ForcedClose))
    );
    assert_eq!(socket.state(), SocketState::Closed);
}

#[tokio::test]
async fn no_packet_lost_nor_duplicated_across_swap() {
    let (socket, mut server, mut ws_conns, mut events) = connect(config().build());
    let (_, res) = server.get().await;
    res.send(&handshake(&["websocket"], 25000, 20000));
    assert_eq!(events.recv().await, Some(Event::Open));

    // The write is still in flight when the upgrade starts
    socket.emit("m1").unwrap();
    let (body, write) = server.post().await;
    assert_eq!(body, "4m1");

    let (_, mut ws) = ws_conns.recv().await.unwrap();
    assert_eq!(ws.next().await.unwrap().unwrap(), text("2probe"));
    ws.send(text("3probe")).await.unwrap();

    // Buffered by the socket while the polling transport pauses
    socket.emit("m2").unwrap();
    // Received on the websocket before the swap, delivered after it
    ws.send(text("4new")).await.unwrap();

    let (_, poll) = server.get().await;
    poll.send("4old");
    assert_eq!(events.recv().await, Some(Event::Message("old".into())));
    tokio::task::yield_now().await;
    assert!(drain(&mut events).is_empty());

    write.send("ok");
    let upgrade = answer_polls_until_upgrade(&mut server, &mut ws).await;
    assert_eq!(upgrade, text("5"));
    assert_eq!(ws.next().await.unwrap().unwrap(), text("4m2"));
    assert_eq!(
        events.recv().await,
        Some(Event::Upgrade(TransportType::Websocket))
    );
    assert_eq!(events.recv().await, Some(Event::Message("new".into())));

    // Every message was delivered exactly once
    tokio::task::yield_now().await;
    assert!(drain(&mut events).is_empty());
    assert_eq!(socket.transport_type(), TransportType::Websocket);
}

#[tokio::test]
async fn invalid_probe_response() {
    let (socket, mut server, mut ws_conns, mut events) = connect(config().build());
    let (_, res) = server.get().await;
    res.send(&handshake(&["websocket"], 25000, 20000));
    assert_eq!(events.recv().await, Some(Event::Open));

    let (_, mut ws) = ws_conns.recv().await.unwrap();
    assert_eq!(ws.next().await.unwrap().unwrap(), text("2probe"));
    ws.send(text("3nope")).await.unwrap();
    assert!(matches!(events.recv().await, Some(Event::UpgradeError(_))));

    // The polling transport is still used
    let (_, poll) = server.get().await;
    poll.send("4still polling");
    assert_eq!(
        events.recv().await,
        Some(Event::Message("still polling".into()))
    );
    assert_eq!(socket.transport_type(), TransportType::Polling);
    assert_eq!(socket.state(), SocketState::Open);
}

#[tokio::test(start_paused = true)]
async fn upgrade_timeout() {
    let (socket, mut server, mut ws_conns, mut events) = connect(
        config()
            .upgrade_timeout(Duration::from_millis(500))
            .build(),
    );
    let (_, res) = server.get().await;
    res.send(&handshake(&["websocket"], 25000, 20000));
    assert_eq!(events.recv().await, Some(Event::Open));

    let (_, mut ws) = ws_conns.recv().await.unwrap();
    assert_eq!(ws.next().await.unwrap().unwrap(), text("2probe"));
    let _poll = server.get().await;

    assert_eq!(
        events.recv().await,
        Some(Event::UpgradeError("upgrade timeout".into()))
    );
    assert_eq!(socket.transport_type(), TransportType::Polling);
    assert_eq!(socket.state(), SocketState::Open);
}

#[tokio::test]
async fn upgrade_disabled() {
    let (socket, mut server, mut ws_conns, mut events) = connect(config().upgrade(false).build());
    let (_, res) = server.get().await;
    res.send(&handshake(&["websocket"], 25000, 20000));
    assert_eq!(events.recv().await, Some(Event::Open));

    let (_, poll) = server.get().await;
    poll.send("4hello");
    assert_eq!(events.recv().await, Some(Event::Message("hello".into())));
    assert!(ws_conns.try_recv().is_err());
    assert_eq!(socket.transport_type(), TransportType::Polling);
}

#[tokio::test]
async fn websocket_only() {
    let (socket, _server, mut ws_conns, mut events) =
        connect(config().transports([TransportType::Websocket]).build());
    assert_eq!(socket.transport_type(), TransportType::Websocket);

    let (url, mut ws) = ws_conns.recv().await.unwrap();
    assert_eq!(url, "ws://localhost/engine.io/?EIO=4&transport=websocket");
    ws.send(text(&handshake(&[], 25000, 20000))).await.unwrap();
    assert_eq!(events.recv().await, Some(Event::Open));
    assert_eq!(socket.id().map(|sid| sid.as_str()), Some("abc"));

    socket.emit("hi").unwrap();
    assert_eq!(ws.next().await.unwrap().unwrap(), text("4hi"));
    ws.send(text("2")).await.unwrap();
    assert_eq!(events.recv().await, Some(Event::Ping));
    assert_eq!(ws.next().await.unwrap().unwrap(), text("3"));

    ws.send(text("1")).await.unwrap();
    assert_eq!(
        events.recv().await,
        Some(Event::Close(CloseReason::TransportClose))
    );
}
