//! Operation relay: forwards operations between room participants and
//! brokers the host-to-joiner state handoff.
//!
//! ```text
//!   conn A ──SendOperation──►┐
//!                            │  recipients(room, except A)
//!                            ├──────────────► outbound[B] ──► conn B
//!                            └──────────────► outbound[C] ──► conn C
//!
//!   conn D ──JoinRoom──►  directory.join ──► host (A) gets RequestCanvasState(D)
//!   conn A ──SendCanvasStateToClient(D)──► outbound[D] only
//! ```
//!
//! The relay has no notion of the canvas. Operations and snapshots pass
//! through untouched. Each connection has one bounded outbound queue, and
//! each connection's inbound messages are handled one at a time, so
//! operations from one sender reach every peer in send order.
//!
//! Sender handles are copied out under the registry lock; the actual
//! sends happen after the lock is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use doodle_canvas::{CanvasSnapshot, Operation};
use tokio::sync::{mpsc, RwLock};

use crate::directory::{DirectoryError, LeaveOutcome, RoomDirectory};
use crate::protocol::{ClientMessage, ConnectionId, Participant, ServerMessage};

/// Relay counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub operations_relayed: u64,
    pub snapshots_relayed: u64,
    pub messages_delivered: u64,
    pub messages_dropped: u64,
    pub active_connections: usize,
    pub active_rooms: usize,
}

/// Lock-free counters for the delivery hot path.
#[derive(Default)]
struct AtomicRelayStats {
    operations_relayed: AtomicU64,
    snapshots_relayed: AtomicU64,
    messages_delivered: AtomicU64,
    messages_dropped: AtomicU64,
}

pub struct Relay {
    directory: RoomDirectory,
    connections: RwLock<HashMap<ConnectionId, mpsc::Sender<ServerMessage>>>,
    stats: AtomicRelayStats,
}

impl Relay {
    pub fn new(directory: RoomDirectory) -> Self {
        Self {
            directory,
            connections: RwLock::new(HashMap::new()),
            stats: AtomicRelayStats::default(),
        }
    }

    pub fn directory(&self) -> &RoomDirectory {
        &self.directory
    }

    /// Register a connection's outbound queue and greet it.
    pub async fn register(&self, outbound: mpsc::Sender<ServerMessage>) -> ConnectionId {
        let connection = ConnectionId::new();
        self.connections.write().await.insert(connection, outbound);
        log::debug!("Connection {connection} registered");
        self.send_to(connection, ServerMessage::Welcome { connection })
            .await;
        connection
    }

    /// Drop a connection. Treated as a leave from every room it was in.
    pub async fn unregister(&self, connection: ConnectionId) {
        self.connections.write().await.remove(&connection);
        for outcome in self.directory.disconnect(connection).await {
            self.announce_leave(outcome).await;
        }
        log::debug!("Connection {connection} unregistered");
    }

    /// Route one decoded client message.
    pub async fn handle_message(&self, connection: ConnectionId, msg: ClientMessage) {
        let result = match msg {
            ClientMessage::JoinRoom {
                room_id,
                display_name,
            } => self.join_room(connection, &room_id, display_name).await,
            ClientMessage::LeaveRoom { room_id } => self.leave_room(connection, &room_id).await,
            ClientMessage::SendOperation { room_id, operation } => {
                self.send_operation(connection, &room_id, operation).await;
                Ok(())
            }
            ClientMessage::SendCanvasStateToClient { target, snapshot } => {
                self.send_canvas_state_to_client(connection, target, snapshot)
                    .await;
                Ok(())
            }
            ClientMessage::Ping => {
                self.send_to(connection, ServerMessage::Pong).await;
                Ok(())
            }
        };

        if let Err(e) = result {
            log::warn!("Rejected request from {connection}: {e}");
            self.send_to(connection, ServerMessage::error_from(&e)).await;
        }
    }

    /// Add the connection to a room. The current host, if any, is asked to
    /// send its canvas to the joiner; then everyone, joiner included,
    /// learns the new membership.
    pub async fn join_room(
        &self,
        connection: ConnectionId,
        room_id: &str,
        display_name: String,
    ) -> Result<(), DirectoryError> {
        let participant = Participant::new(connection, display_name);
        let outcome = self.directory.join(room_id, participant.clone()).await?;

        if let Some(host) = outcome.host {
            log::debug!(
                "Requesting canvas state for {} from host {}",
                connection,
                host.connection
            );
            self.send_to(
                host.connection,
                ServerMessage::RequestCanvasState {
                    room_id: room_id.to_string(),
                    requester: connection,
                },
            )
            .await;
        }

        let members: Vec<ConnectionId> = outcome.participants.iter().map(|p| p.connection).collect();
        self.deliver(
            &members,
            ServerMessage::ClientJoined {
                room_id: room_id.to_string(),
                participant,
                participants: outcome.participants,
            },
        )
        .await;
        Ok(())
    }

    pub async fn leave_room(
        &self,
        connection: ConnectionId,
        room_id: &str,
    ) -> Result<(), DirectoryError> {
        let outcome = self.directory.leave(room_id, connection).await?;
        self.announce_leave(outcome).await;
        Ok(())
    }

    async fn announce_leave(&self, outcome: LeaveOutcome) {
        if outcome.remaining.is_empty() {
            return;
        }
        let members: Vec<ConnectionId> = outcome.remaining.iter().map(|p| p.connection).collect();
        self.deliver(
            &members,
            ServerMessage::ClientLeft {
                room_id: outcome.room_id,
                participant: outcome.participant,
                participants: outcome.remaining,
            },
        )
        .await;
    }

    /// Forward an operation to everyone in the room except the sender.
    pub async fn send_operation(&self, sender: ConnectionId, room_id: &str, operation: Operation) {
        if !self.directory.is_member(room_id, sender).await {
            log::warn!(
                "Dropping {} from {}: not a member of room {}",
                operation.kind.name(),
                sender,
                room_id
            );
            self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let Some(recipients) = self.directory.recipients(room_id, Some(sender)).await else {
            log::warn!("Dropping operation for unknown room {room_id}");
            self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        log::trace!(
            "Relaying {} {} to {} peer(s) in {}",
            operation.kind.name(),
            operation.id,
            recipients.len(),
            room_id
        );
        self.stats.operations_relayed.fetch_add(1, Ordering::Relaxed);
        self.deliver(
            &recipients,
            ServerMessage::ReceiveOperation {
                room_id: room_id.to_string(),
                operation,
            },
        )
        .await;
    }

    /// Hand a host's snapshot to exactly one connection.
    pub async fn send_canvas_state_to_client(
        &self,
        sender: ConnectionId,
        target: ConnectionId,
        snapshot: CanvasSnapshot,
    ) {
        log::debug!(
            "Relaying canvas state ({} operations) from {} to {}",
            snapshot.operations.len(),
            sender,
            target
        );
        if self
            .send_to(target, ServerMessage::ReceiveCanvasState { snapshot })
            .await
        {
            self.stats.snapshots_relayed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Queue one message for one connection. Returns whether it was queued.
    pub async fn send_to(&self, connection: ConnectionId, msg: ServerMessage) -> bool {
        self.deliver(&[connection], msg).await == 1
    }

    /// Queue `msg` on each recipient's outbound channel. Returns how many
    /// accepted it.
    async fn deliver(&self, recipients: &[ConnectionId], msg: ServerMessage) -> usize {
        let senders: Vec<(ConnectionId, mpsc::Sender<ServerMessage>)> = {
            let connections = self.connections.read().await;
            recipients
                .iter()
                .filter_map(|c| connections.get(c).map(|tx| (*c, tx.clone())))
                .collect()
        };

        let missing = recipients.len() - senders.len();
        if missing > 0 {
            log::warn!("{} recipient(s) of {} not connected", missing, msg.name());
            self.stats
                .messages_dropped
                .fetch_add(missing as u64, Ordering::Relaxed);
        }

        let mut delivered = 0;
        for (connection, tx) in senders {
            if tx.send(msg.clone()).await.is_ok() {
                delivered += 1;
            } else {
                log::debug!("Outbound queue of {connection} closed");
                self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.stats
            .messages_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }

    pub async fn stats(&self) -> RelayStats {
        RelayStats {
            operations_relayed: self.stats.operations_relayed.load(Ordering::Relaxed),
            snapshots_relayed: self.stats.snapshots_relayed.load(Ordering::Relaxed),
            messages_delivered: self.stats.messages_delivered.load(Ordering::Relaxed),
            messages_dropped: self.stats.messages_dropped.load(Ordering::Relaxed),
            active_connections: self.connections.read().await.len(),
            active_rooms: self.directory.room_count().await,
        }
    }
}
