//! WebSocket client for the relay server.
//!
//! Provides:
//! - Connection lifecycle (connect, disconnect)
//! - Typed senders for every client message
//! - A stream of [`RelayEvent`]s for the application (usually fed into a
//!   [`CanvasSession`](crate::session::CanvasSession))

use std::sync::Arc;

use doodle_canvas::{CanvasSnapshot, Operation};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::{ClientMessage, ConnectionId, ProtocolError, ServerMessage};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Socket open, welcome not yet received.
    Connecting,
    /// Welcomed; `connection_id()` is set.
    Connected,
}

/// Events emitted by the relay client.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// The relay greeted us and assigned our connection id.
    Connected(ConnectionId),
    /// Connection lost
    Disconnected,
    /// Any other relay message, in arrival order.
    Message(ServerMessage),
}

pub struct RelayClient {
    server_url: String,
    display_name: String,

    /// Connection state
    state: Arc<RwLock<ConnectionState>>,

    /// Assigned by the relay on connect
    connection: Arc<RwLock<Option<ConnectionId>>>,

    /// Channel to the WebSocket writer task
    outgoing_tx: Option<mpsc::Sender<ClientMessage>>,

    /// Event receiver for the application
    event_rx: Option<mpsc::Receiver<RelayEvent>>,

    /// Event sender (held by the reader task)
    event_tx: mpsc::Sender<RelayEvent>,
}

impl RelayClient {
    pub fn new(server_url: impl Into<String>, display_name: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            server_url: server_url.into(),
            display_name: display_name.into(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            connection: Arc::new(RwLock::new(None)),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<RelayEvent>> {
        self.event_rx.take()
    }

    /// Connect to the server.
    ///
    /// Spawns background tasks for reading and writing frames. The state
    /// stays `Connecting` until the relay's welcome arrives.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let (ws_stream, _) = match tokio_tungstenite::connect_async(&self.server_url).await {
            Ok(ok) => ok,
            Err(e) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ProtocolError::ConnectionFailed(e.to_string()));
            }
        };
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward the outgoing channel to the socket
        let (out_tx, mut out_rx) = mpsc::channel::<ClientMessage>(256);
        self.outgoing_tx = Some(out_tx);
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let text = match msg.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        log::error!("Failed to encode client message: {e}");
                        continue;
                    }
                };
                if ws_writer.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        // Reader task: decode frames into events
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        let connection = self.connection.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match ServerMessage::decode(text.as_str()) {
                        Ok(ServerMessage::Welcome { connection: id }) => {
                            *connection.write().await = Some(id);
                            *state.write().await = ConnectionState::Connected;
                            let _ = event_tx.send(RelayEvent::Connected(id)).await;
                        }
                        Ok(server_msg) => {
                            let _ = event_tx.send(RelayEvent::Message(server_msg)).await;
                        }
                        Err(e) => log::warn!("Failed to decode server message: {e}"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            // Connection lost
            *state.write().await = ConnectionState::Disconnected;
            *connection.write().await = None;
            let _ = event_tx.send(RelayEvent::Disconnected).await;
        });

        log::info!("{} connected to {}", self.display_name, self.server_url);
        Ok(())
    }

    /// Close the connection. The reader task reports `Disconnected`.
    pub fn disconnect(&mut self) {
        // Dropping the only sender ends the writer task, which closes the socket.
        self.outgoing_tx = None;
    }

    /// Send any client message.
    pub async fn send(&self, msg: ClientMessage) -> Result<(), ProtocolError> {
        let tx = self
            .outgoing_tx
            .as_ref()
            .ok_or(ProtocolError::ConnectionClosed)?;
        tx.send(msg)
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    pub async fn join_room(&self, room_id: impl Into<String>) -> Result<(), ProtocolError> {
        self.send(ClientMessage::JoinRoom {
            room_id: room_id.into(),
            display_name: self.display_name.clone(),
        })
        .await
    }

    pub async fn leave_room(&self, room_id: impl Into<String>) -> Result<(), ProtocolError> {
        self.send(ClientMessage::LeaveRoom {
            room_id: room_id.into(),
        })
        .await
    }

    pub async fn send_operation(
        &self,
        room_id: impl Into<String>,
        operation: Operation,
    ) -> Result<(), ProtocolError> {
        self.send(ClientMessage::SendOperation {
            room_id: room_id.into(),
            operation,
        })
        .await
    }

    pub async fn send_canvas_state_to_client(
        &self,
        target: ConnectionId,
        snapshot: CanvasSnapshot,
    ) -> Result<(), ProtocolError> {
        self.send(ClientMessage::SendCanvasStateToClient { target, snapshot })
            .await
    }

    pub async fn send_ping(&self) -> Result<(), ProtocolError> {
        self.send(ClientMessage::Ping).await
    }

    /// Get the current connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Our relay-assigned id, once the welcome has arrived.
    pub async fn connection_id(&self) -> Option<ConnectionId> {
        *self.connection.read().await
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}
