//! Room directory: which connections share which canvas, and who hosts it.
//!
//! ```text
//! rooms: RwLock<HashMap<room_id, Room>>
//!
//!   "abc" ─► [ Alice (host) , Bob , Carol ]     ◄─ join appends at the tail
//!   "xyz" ─► [ Dave (host) ]                     ◄─ host = position 0
//! ```
//!
//! Host status is positional: when the host leaves, the next participant
//! in join order becomes host without any handover. A room exists only
//! while it has participants.
//!
//! All mutations go through one write lock, so joins and leaves of a room
//! are linearized.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::RwLock;

use crate::protocol::{ConnectionId, ErrorCode, Participant};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("connection {connection} is already in room {room_id}")]
    AlreadyJoined {
        room_id: String,
        connection: ConnectionId,
    },
    #[error("room {room_id} is full ({max} participants)")]
    RoomFull { room_id: String, max: usize },
    #[error("connection {connection} is not in room {room_id}")]
    NotInRoom {
        room_id: String,
        connection: ConnectionId,
    },
}

impl ErrorCode for DirectoryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyJoined { .. } => "E_ALREADY_JOINED",
            Self::RoomFull { .. } => "E_ROOM_FULL",
            Self::NotInRoom { .. } => "E_NOT_IN_ROOM",
        }
    }
}

/// A room and its participants in join order.
#[derive(Debug, Clone)]
struct Room {
    participants: Vec<Participant>,
}

impl Room {
    fn position(&self, connection: ConnectionId) -> Option<usize> {
        self.participants
            .iter()
            .position(|p| p.connection == connection)
    }
}

/// Result of a successful join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    /// Host to ask for the canvas state. `None` when the joiner is first.
    pub host: Option<Participant>,
    /// Everyone in the room after the join, joiner last.
    pub participants: Vec<Participant>,
}

/// Result of a successful leave.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaveOutcome {
    pub room_id: String,
    pub participant: Participant,
    /// Who is left, new host first. Empty when the room was deleted.
    pub remaining: Vec<Participant>,
}

pub struct RoomDirectory {
    rooms: RwLock<HashMap<String, Room>>,
    max_participants: usize,
}

impl RoomDirectory {
    /// `max_participants == 0` means unlimited.
    pub fn new(max_participants: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            max_participants,
        }
    }

    pub async fn join(
        &self,
        room_id: &str,
        participant: Participant,
    ) -> Result<JoinOutcome, DirectoryError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(room_id.to_string()).or_insert_with(|| {
            log::info!("Room {room_id} created");
            Room {
                participants: Vec::new(),
            }
        });

        if room.position(participant.connection).is_some() {
            return Err(DirectoryError::AlreadyJoined {
                room_id: room_id.to_string(),
                connection: participant.connection,
            });
        }
        if self.max_participants > 0 && room.participants.len() >= self.max_participants {
            return Err(DirectoryError::RoomFull {
                room_id: room_id.to_string(),
                max: self.max_participants,
            });
        }

        let host = room.participants.first().cloned();
        log::info!(
            "{} ({}) joined room {} ({} participants)",
            participant.display_name,
            participant.connection,
            room_id,
            room.participants.len() + 1
        );
        room.participants.push(participant);

        Ok(JoinOutcome {
            host,
            participants: room.participants.clone(),
        })
    }

    pub async fn leave(
        &self,
        room_id: &str,
        connection: ConnectionId,
    ) -> Result<LeaveOutcome, DirectoryError> {
        let mut rooms = self.rooms.write().await;
        let not_in_room = || DirectoryError::NotInRoom {
            room_id: room_id.to_string(),
            connection,
        };
        let room = rooms.get_mut(room_id).ok_or_else(not_in_room)?;
        let index = room.position(connection).ok_or_else(not_in_room)?;
        let participant = room.participants.remove(index);
        let remaining = room.participants.clone();

        log::info!(
            "{} ({}) left room {} ({} remaining)",
            participant.display_name,
            connection,
            room_id,
            remaining.len()
        );
        if remaining.is_empty() {
            rooms.remove(room_id);
            log::info!("Room {room_id} removed (empty)");
        } else if index == 0 {
            log::info!("{} is now host of room {}", remaining[0].display_name, room_id);
        }

        Ok(LeaveOutcome {
            room_id: room_id.to_string(),
            participant,
            remaining,
        })
    }

    /// Leave every room the connection is in.
    pub async fn disconnect(&self, connection: ConnectionId) -> Vec<LeaveOutcome> {
        let mut rooms = self.rooms.write().await;
        let mut outcomes = Vec::new();

        for (room_id, room) in rooms.iter_mut() {
            if let Some(index) = room.position(connection) {
                let participant = room.participants.remove(index);
                log::info!(
                    "{} ({}) disconnected from room {}",
                    participant.display_name,
                    connection,
                    room_id
                );
                outcomes.push(LeaveOutcome {
                    room_id: room_id.clone(),
                    participant,
                    remaining: room.participants.clone(),
                });
            }
        }

        rooms.retain(|room_id, room| {
            let keep = !room.participants.is_empty();
            if !keep {
                log::info!("Room {room_id} removed (empty)");
            }
            keep
        });
        outcomes
    }

    pub async fn host(&self, room_id: &str) -> Option<Participant> {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).and_then(|r| r.participants.first().cloned())
    }

    /// Participants in join order; empty for an unknown room.
    pub async fn participants(&self, room_id: &str) -> Vec<Participant> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room_id)
            .map(|r| r.participants.clone())
            .unwrap_or_default()
    }

    /// Connections in the room other than `except`. `None` if the room
    /// does not exist.
    pub async fn recipients(
        &self,
        room_id: &str,
        except: Option<ConnectionId>,
    ) -> Option<Vec<ConnectionId>> {
        let rooms = self.rooms.read().await;
        let room = rooms.get(room_id)?;
        Some(
            room.participants
                .iter()
                .map(|p| p.connection)
                .filter(|c| Some(*c) != except)
                .collect(),
        )
    }

    pub async fn is_member(&self, room_id: &str, connection: ConnectionId) -> bool {
        let rooms = self.rooms.read().await;
        rooms
            .get(room_id)
            .is_some_and(|r| r.position(connection).is_some())
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
