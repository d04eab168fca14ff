//! WebSocket relay server.
//!
//! Architecture:
//! ```text
//! TcpListener ──accept──► task per connection
//!                           │
//!                           ├── reader: ws frame ─► ClientMessage ─► Relay::handle_message
//!                           │                                         (one message at a time)
//!                           └── writer: outbound mpsc ─► ServerMessage ─► ws frame
//!
//!                         Relay (shared, Arc)
//!                           ├── RoomDirectory   RwLock<HashMap<room, [participants]>>
//!                           └── connections     RwLock<HashMap<ConnectionId, Sender>>
//! ```
//!
//! A dropped socket and an explicit leave look the same to the rest of the
//! room: the connection is unregistered and every room it was in hears a
//! `client_left`.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;

use crate::directory::RoomDirectory;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::relay::Relay;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Maximum participants per room (0 = unlimited)
    pub max_participants_per_room: usize,
    /// Outbound queue capacity per connection
    pub outbound_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            max_participants_per_room: 32,
            outbound_capacity: 256,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub malformed_messages: u64,
}

pub struct RelayServer {
    config: ServerConfig,
    relay: Arc<Relay>,
    stats: Arc<RwLock<ServerStats>>,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> Self {
        let directory = RoomDirectory::new(config.max_participants_per_room);
        Self {
            config,
            relay: Arc::new(Relay::new(directory)),
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), Box<dyn std::error::Error>> {
        log::info!("Relay server listening on {}", listener.local_addr()?);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let relay = self.relay.clone();
            let stats = self.stats.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, relay, stats, config).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        relay: Arc<Relay>,
        stats: Arc<RwLock<ServerStats>>,
        config: ServerConfig,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(config.outbound_capacity.max(1));

        // Writer task: drain the outbound queue into the socket. It ends when
        // the relay drops the connection's sender or the socket fails.
        let mut writer = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let text = match msg.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        log::error!("Failed to encode {}: {e}", msg.name());
                        continue;
                    }
                };
                if ws_sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        let connection = relay.register(out_tx).await;
        log::info!("WebSocket connection {connection} established from {addr}");

        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            {
                                let mut s = stats.write().await;
                                s.total_messages += 1;
                                s.total_bytes += text.len() as u64;
                            }
                            match ClientMessage::decode(text.as_str()) {
                                Ok(client_msg) => relay.handle_message(connection, client_msg).await,
                                Err(e) => {
                                    log::warn!("Failed to decode message from {addr}: {e}");
                                    stats.write().await.malformed_messages += 1;
                                }
                            }
                        }

                        Some(Ok(Message::Binary(_))) => {
                            log::warn!("Ignoring binary frame from {addr}");
                            stats.write().await.malformed_messages += 1;
                        }

                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection closed from {addr}");
                            break;
                        }

                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }

                        _ => {}
                    }
                }

                _ = &mut writer => {
                    log::debug!("Writer for {connection} stopped");
                    break;
                }
            }
        }

        relay.unregister(connection).await;
        {
            let mut s = stats.write().await;
            s.active_connections = s.active_connections.saturating_sub(1);
        }
        log::info!("Connection {connection} from {addr} cleaned up");

        Ok(())
    }

    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9090");
        assert_eq!(config.max_participants_per_room, 32);
        assert_eq!(config.outbound_capacity, 256);
    }

    #[test]
    fn test_server_custom_config() {
        let config = ServerConfig {
            bind_addr: "0.0.0.0:8080".to_string(),
            max_participants_per_room: 4,
            outbound_capacity: 16,
        };
        let server = RelayServer::new(config);
        assert_eq!(server.bind_addr(), "0.0.0.0:8080");
    }

    #[tokio::test]
    async fn test_server_stats_initial() {
        let server = RelayServer::with_defaults();
        let stats = server.stats().await;
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.total_messages, 0);
        assert_eq!(stats.malformed_messages, 0);
        assert_eq!(server.relay().stats().await.active_rooms, 0);
    }

    #[tokio::test]
    async fn test_room_limit_from_config() {
        let server = RelayServer::new(ServerConfig {
            max_participants_per_room: 1,
            ..ServerConfig::default()
        });
        let relay = server.relay();
        let (tx1, _rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let a = relay.register(tx1).await;
        let b = relay.register(tx2).await;
        relay.join_room(a, "abc", "A".into()).await.unwrap();
        assert!(relay.join_room(b, "abc", "B".into()).await.is_err());

        relay
            .handle_message(
                b,
                ClientMessage::JoinRoom {
                    room_id: "abc".into(),
                    display_name: "B".into(),
                },
            )
            .await;
        let _welcome = rx2.recv().await;
        match rx2.recv().await {
            Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "E_ROOM_FULL"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
