//! Integration tests for end-to-end WebSocket collaboration.
//!
//! These tests start a real relay server and connect real clients,
//! driving canvas sessions through the full join / draw / leave cycle.

use std::sync::Arc;
use std::time::Instant;

use doodle_canvas::{Gesture, Operation, OperationKind, Paint, Point, ToolKind};
use doodle_collab::client::{ConnectionState, RelayClient, RelayEvent};
use doodle_collab::protocol::{ClientMessage, ConnectionId, ServerMessage};
use doodle_collab::relay::Relay;
use doodle_collab::server::{RelayServer, ServerConfig};
use doodle_collab::session::{CanvasSession, SessionConfig};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;

/// Start a server on a free port; return the URL and its relay.
async fn start_test_server() -> (String, Arc<Relay>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = ServerConfig {
        bind_addr: format!("127.0.0.1:{port}"),
        max_participants_per_room: 10,
        outbound_capacity: 64,
    };
    let server = RelayServer::new(config);
    let relay = server.relay().clone();
    tokio::spawn(async move {
        server.serve(listener).await.unwrap();
    });
    (format!("ws://127.0.0.1:{port}"), relay)
}

async fn next_event(rx: &mut mpsc::Receiver<RelayEvent>) -> RelayEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for relay event")
        .expect("event channel closed")
}

async fn next_message(rx: &mut mpsc::Receiver<RelayEvent>) -> ServerMessage {
    match next_event(rx).await {
        RelayEvent::Message(msg) => msg,
        other => panic!("expected server message, got {other:?}"),
    }
}

/// Nothing else arrives within a short grace period.
async fn assert_quiet(rx: &mut mpsc::Receiver<RelayEvent>) {
    let extra = timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(extra.is_err(), "unexpected event: {extra:?}");
}

struct Peer {
    client: RelayClient,
    events: mpsc::Receiver<RelayEvent>,
    id: ConnectionId,
    session: CanvasSession,
}

impl Peer {
    async fn connect(url: &str, name: &str, room: &str) -> Self {
        let mut client = RelayClient::new(url, name);
        let mut events = client.take_event_rx().unwrap();
        client.connect().await.unwrap();
        let id = match next_event(&mut events).await {
            RelayEvent::Connected(id) => id,
            other => panic!("expected Connected, got {other:?}"),
        };
        let mut session = CanvasSession::new(room, SessionConfig::default());
        session.set_connection(id);
        Self {
            client,
            events,
            id,
            session,
        }
    }

    async fn join(&mut self) {
        let msg = self.session.join_message(self.client.display_name());
        self.client.send(msg).await.unwrap();
    }

    /// Feed the next relay message to the session and send its replies.
    async fn pump(&mut self) -> ServerMessage {
        let msg = next_message(&mut self.events).await;
        for reply in self.session.handle(msg.clone(), Instant::now()) {
            self.client.send(reply).await.unwrap();
        }
        msg
    }

    async fn draw(&mut self, ops: Vec<Operation>) {
        for op in ops {
            if let Some(msg) = self.session.apply_local(op) {
                self.client.send(msg).await.unwrap();
            }
        }
    }
}

fn pencil_stroke() -> Vec<Operation> {
    let g = Gesture::new();
    vec![
        g.start_stroke(Point::new(0.0, 0.0), Paint::default(), ToolKind::Pencil),
        g.continue_to(Point::new(10.0, 10.0)),
        g.continue_to(Point::new(20.0, 0.0)),
        g.end_stroke(),
    ]
}

#[tokio::test]
async fn test_server_accepts_connections_with_welcome() {
    let (url, _relay) = start_test_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    let frame = timeout(Duration::from_secs(2), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match frame {
        Message::Text(text) => assert!(matches!(
            ServerMessage::decode(text.as_str()).unwrap(),
            ServerMessage::Welcome { .. }
        )),
        other => panic!("expected text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_client_connected_only_after_welcome() {
    let (url, _relay) = start_test_server().await;
    let mut client = RelayClient::new(&url, "Alice");
    let mut events = client.take_event_rx().unwrap();
    client.connect().await.unwrap();

    let id = match next_event(&mut events).await {
        RelayEvent::Connected(id) => id,
        other => panic!("expected Connected, got {other:?}"),
    };
    assert_eq!(client.connection_state().await, ConnectionState::Connected);
    assert_eq!(client.connection_id().await, Some(id));
}

#[tokio::test]
async fn test_alice_and_bob_share_a_stroke() {
    let (url, relay) = start_test_server().await;

    let mut alice = Peer::connect(&url, "Alice", "abc").await;
    alice.join().await;
    alice.pump().await;
    assert!(alice.session.is_live());
    assert!(alice.session.is_host());

    let mut bob = Peer::connect(&url, "Bob", "abc").await;
    bob.join().await;
    match bob.pump().await {
        ServerMessage::ClientJoined { participants, .. } => {
            assert_eq!(participants.len(), 2);
            assert_eq!(participants[0].connection, alice.id);
        }
        other => panic!("unexpected {other:?}"),
    }

    // Alice is host: she is asked for state, answers, then sees Bob join.
    match alice.pump().await {
        ServerMessage::RequestCanvasState { requester, .. } => assert_eq!(requester, bob.id),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(alice.pump().await, ServerMessage::ClientJoined { .. }));
    assert!(matches!(bob.pump().await, ServerMessage::ReceiveCanvasState { .. }));
    assert!(bob.session.is_live());

    alice.draw(pencil_stroke()).await;

    for _ in 0..4 {
        assert!(matches!(bob.pump().await, ServerMessage::ReceiveOperation { .. }));
    }
    assert_quiet(&mut bob.events).await;
    assert_quiet(&mut alice.events).await;

    assert_eq!(bob.session.history().len(), 4);
    let drawables = bob.session.drawables();
    assert_eq!(drawables.len(), 1);
    let stroke = drawables.strokes().next().unwrap();
    assert_eq!(stroke.path.points().len(), 3);
    assert_eq!(bob.session.drawables(), alice.session.drawables());

    let leave = alice.session.leave_message();
    alice.client.send(leave).await.unwrap();
    match bob.pump().await {
        ServerMessage::ClientLeft { participant, participants, .. } => {
            assert_eq!(participant.connection, alice.id);
            assert_eq!(participants.len(), 1);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(bob.session.is_host());

    let members = relay.directory().participants("abc").await;
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].connection, bob.id);
    assert_eq!(relay.directory().host("abc").await.map(|p| p.connection), Some(bob.id));
}

#[tokio::test]
async fn test_late_joiner_is_seeded_from_host() {
    let (url, _relay) = start_test_server().await;

    let mut alice = Peer::connect(&url, "Alice", "abc").await;
    alice.join().await;
    alice.pump().await;
    alice.draw(pencil_stroke()).await;
    alice.draw(pencil_stroke()).await;
    alice.session.undo();

    let mut bob = Peer::connect(&url, "Bob", "abc").await;
    bob.join().await;
    bob.pump().await; // ClientJoined
    alice.pump().await; // RequestCanvasState, answered by the session
    alice.pump().await; // ClientJoined
    bob.pump().await; // ReceiveCanvasState

    assert!(bob.session.is_live());
    assert_eq!(bob.session.history().len(), 8);
    assert_eq!(bob.session.history().cursor(), 4);
    assert_eq!(bob.session.drawables(), alice.session.drawables());
    assert_eq!(bob.session.drawables().len(), 1);
}

#[tokio::test]
async fn test_broadcast_excludes_sender() {
    let (url, _relay) = start_test_server().await;
    let mut peers = Vec::new();
    for name in ["A", "B", "C"] {
        let mut peer = Peer::connect(&url, name, "room").await;
        peer.client.join_room("room").await.unwrap();
        peers.push(peer);
    }
    // Drain membership traffic.
    tokio::time::sleep(Duration::from_millis(200)).await;
    for peer in &mut peers {
        while peer.events.try_recv().is_ok() {}
    }

    let op = pencil_stroke().remove(0);
    peers[1].client.send_operation("room", op.clone()).await.unwrap();

    for i in [0, 2] {
        match next_message(&mut peers[i].events).await {
            ServerMessage::ReceiveOperation { operation, .. } => assert_eq!(operation, op),
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_quiet(&mut peers[1].events).await;
}

#[tokio::test]
async fn test_state_transfer_reaches_only_target() {
    let (url, _relay) = start_test_server().await;
    let mut a = Peer::connect(&url, "A", "room").await;
    let mut b = Peer::connect(&url, "B", "room").await;
    let mut c = Peer::connect(&url, "C", "room").await;
    for peer in [&a, &b, &c] {
        peer.client.join_room("room").await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    for peer in [&mut a, &mut b, &mut c] {
        while peer.events.try_recv().is_ok() {}
    }

    let snapshot = doodle_canvas::CanvasSnapshot {
        operations: pencil_stroke(),
        cursor: 4,
    };
    a.client
        .send_canvas_state_to_client(c.id, snapshot.clone())
        .await
        .unwrap();

    match next_message(&mut c.events).await {
        ServerMessage::ReceiveCanvasState { snapshot: got } => assert_eq!(got, snapshot),
        other => panic!("unexpected {other:?}"),
    }
    assert_quiet(&mut b.events).await;
}

#[tokio::test]
async fn test_disconnect_is_treated_as_leave() {
    let (url, relay) = start_test_server().await;
    let mut alice = Peer::connect(&url, "Alice", "abc").await;
    alice.join().await;
    alice.pump().await;

    let mut bob = Peer::connect(&url, "Bob", "abc").await;
    bob.join().await;
    bob.pump().await;
    alice.pump().await;
    alice.pump().await;
    bob.pump().await;

    // Half-finished stroke, then Alice drops.
    let g = Gesture::new();
    alice
        .draw(vec![
            g.start_stroke(Point::ORIGIN, Paint::default(), ToolKind::Pencil),
            g.continue_to(Point::new(4.0, 4.0)),
        ])
        .await;
    bob.pump().await;
    bob.pump().await;
    alice.client.disconnect();

    match bob.pump().await {
        ServerMessage::ClientLeft { participant, .. } => assert_eq!(participant.connection, alice.id),
        other => panic!("unexpected {other:?}"),
    }
    assert!(bob.session.is_host());
    // The dangling action is still drawn, and later edits replay fine.
    assert_eq!(bob.session.drawables().len(), 1);
    bob.draw(pencil_stroke()).await;
    assert_eq!(bob.session.drawables().len(), 2);

    assert_eq!(
        timeout(Duration::from_secs(2), alice.events.recv()).await.unwrap(),
        Some(RelayEvent::Disconnected)
    );
    assert_eq!(alice.client.connection_state().await, ConnectionState::Disconnected);
    assert_eq!(relay.directory().participants("abc").await.len(), 1);
}

#[tokio::test]
async fn test_remote_undo_propagates() {
    let (url, _relay) = start_test_server().await;
    let mut alice = Peer::connect(&url, "Alice", "abc").await;
    alice.join().await;
    alice.pump().await;
    let mut bob = Peer::connect(&url, "Bob", "abc").await;
    bob.join().await;
    bob.pump().await;
    alice.pump().await;
    alice.pump().await;
    bob.pump().await;

    let ops = pencil_stroke();
    let target = ops[0].target();
    alice.draw(ops).await;
    for _ in 0..4 {
        bob.pump().await;
    }
    assert_eq!(bob.session.drawables().len(), 1);

    let notice = alice.session.undo().unwrap();
    alice.client.send(notice).await.unwrap();
    match bob.pump().await {
        ServerMessage::ReceiveOperation { operation, .. } => {
            assert_eq!(operation.kind, OperationKind::Undo { target });
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(bob.session.drawables().is_empty());
    assert!(alice.session.drawables().is_empty());
}

#[tokio::test]
async fn test_join_errors_reported() {
    let (url, _relay) = start_test_server().await;
    let mut alice = Peer::connect(&url, "Alice", "abc").await;
    alice.client.join_room("abc").await.unwrap();
    assert!(matches!(next_message(&mut alice.events).await, ServerMessage::ClientJoined { .. }));

    alice.client.join_room("abc").await.unwrap();
    match next_message(&mut alice.events).await {
        ServerMessage::Error { code, .. } => assert_eq!(code, "E_ALREADY_JOINED"),
        other => panic!("unexpected {other:?}"),
    }

    alice.client.leave_room("nowhere").await.unwrap();
    match next_message(&mut alice.events).await {
        ServerMessage::Error { code, .. } => assert_eq!(code, "E_NOT_IN_ROOM"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection() {
    let (url, _relay) = start_test_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let _welcome = ws.next().await;

    ws.send(Message::Text("{\"type\":\"teleport\"}".to_string().into())).await.unwrap();
    ws.send(Message::Text(ClientMessage::Ping.encode().unwrap().into()))
        .await
        .unwrap();

    let frame = timeout(Duration::from_secs(2), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match frame {
        Message::Text(text) => {
            assert_eq!(ServerMessage::decode(text.as_str()).unwrap(), ServerMessage::Pong)
        }
        other => panic!("expected pong, got {other:?}"),
    }
}

#[tokio::test]
async fn test_ping_pong() {
    let (url, _relay) = start_test_server().await;
    let mut alice = Peer::connect(&url, "Alice", "abc").await;
    alice.client.send_ping().await.unwrap();
    assert_eq!(next_message(&mut alice.events).await, ServerMessage::Pong);
}
