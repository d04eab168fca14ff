//! # doodle-collab - Room directory and operation relay for shared canvases
//!
//! Participants draw on their own [`CanvasHistory`](doodle_canvas::CanvasHistory)
//! and exchange operations through a relay that knows rooms and
//! connections, never canvases.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     WebSocket      ┌──────────────┐
//! │ RelayClient  │ ◄────────────────► │ RelayServer  │
//! │ (per user)   │     JSON frames    │ (central)    │
//! └──────┬───────┘                    └──────┬───────┘
//!        │ RelayEvent                        │
//!        ▼                                   ▼
//! ┌──────────────┐                    ┌──────────────┐
//! │ CanvasSession│                    │    Relay     │
//! │ log + replay │                    │ fan-out, N-1 │
//! └──────────────┘                    └──────┬───────┘
//!                                            │
//!                                    ┌───────┴───────┐
//!                                    │ RoomDirectory │
//!                                    │ host = first  │
//!                                    └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: Tagged JSON client/server messages
//! - [`directory`]: Rooms, participants and host election
//! - [`relay`]: Operation fan-out and state-transfer brokering
//! - [`server`]: WebSocket relay server
//! - [`client`]: WebSocket relay client
//! - [`session`]: Join, seed, buffer and timeout handling on the client side

pub mod protocol;
pub mod directory;
pub mod relay;
pub mod server;
pub mod client;
pub mod session;

pub use protocol::{
    ClientMessage, ConnectionId, ErrorCode, Participant, ProtocolError, ServerMessage,
};
pub use directory::{DirectoryError, JoinOutcome, LeaveOutcome, RoomDirectory};
pub use relay::{Relay, RelayStats};
pub use server::{RelayServer, ServerConfig, ServerStats};
pub use client::{ConnectionState, RelayClient, RelayEvent};
pub use session::{CanvasSession, SessionConfig, SessionState};
