use log::{debug, info, warn};
use shared::{ServerMessage, Slot};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::error::SyncError;

/// Where a connection is in the join protocol. Closed connections are
/// simply removed from the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Bound { session_id: String, slot: Slot },
}

// Live transport endpoint as seen by the dispatcher
#[derive(Debug)]
pub struct Connection {
    pub id: u32,
    pub addr: SocketAddr,
    pub connected_at: Instant,
    pub state: ConnectionState,
    pub dropped_messages: u64,
    sender: mpsc::Sender<Message>,
}

impl Connection {
    pub fn new(id: u32, addr: SocketAddr, sender: mpsc::Sender<Message>) -> Self {
        Connection {
            id,
            addr,
            connected_at: Instant::now(),
            state: ConnectionState::Connected,
            dropped_messages: 0,
            sender,
        }
    }

    pub fn bind(&mut self, session_id: &str, slot: Slot) {
        self.state = ConnectionState::Bound {
            session_id: session_id.to_string(),
            slot,
        };
    }

    pub fn unbind(&mut self) {
        self.state = ConnectionState::Connected;
    }

    pub fn binding(&self) -> Option<(&str, Slot)> {
        match &self.state {
            ConnectionState::Bound { session_id, slot } => Some((session_id.as_str(), *slot)),
            ConnectionState::Connected => None,
        }
    }

    pub fn is_bound_to(&self, session_id: &str) -> bool {
        self.binding().is_some_and(|(bound, _)| bound == session_id)
    }

    // Non-blocking; a full or closed queue counts as a drop
    pub fn send_text(&mut self, text: &str) -> Result<(), SyncError> {
        match self.sender.try_send(Message::text(text.to_owned())) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.dropped_messages += 1;
                Err(SyncError::Delivery { conn_id: self.id })
            }
        }
    }

    pub fn send(&mut self, message: &ServerMessage) -> Result<(), SyncError> {
        let text = message
            .to_json()
            .map_err(|_| SyncError::Delivery { conn_id: self.id })?;
        self.send_text(&text)
    }
}

/// Every live connection, keyed by the id the acceptor assigned
#[derive(Debug, Default)]
pub struct ConnectionTable {
    connections: HashMap<u32, Connection>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }

    pub fn insert(&mut self, connection: Connection) {
        info!("Client {} connected from {}", connection.id, connection.addr);
        self.connections.insert(connection.id, connection);
    }

    pub fn remove(&mut self, conn_id: u32) -> Option<Connection> {
        let removed = self.connections.remove(&conn_id);
        if let Some(connection) = &removed {
            info!(
                "Client {} disconnected after {:?}",
                connection.id,
                connection.connected_at.elapsed()
            );
            if connection.dropped_messages > 0 {
                warn!(
                    "Client {} missed {} undeliverable messages",
                    connection.id, connection.dropped_messages
                );
            }
        }
        removed
    }

    pub fn get(&self, conn_id: u32) -> Option<&Connection> {
        self.connections.get(&conn_id)
    }

    pub fn get_mut(&mut self, conn_id: u32) -> Option<&mut Connection> {
        self.connections.get_mut(&conn_id)
    }

    /// Ids of connections currently bound to `session_id`
    pub fn bound_to(&self, session_id: &str) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .connections
            .values()
            .filter(|connection| connection.is_bound_to(session_id))
            .map(|connection| connection.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_attended(&self, session_id: &str) -> bool {
        self.connections
            .values()
            .any(|connection| connection.is_bound_to(session_id))
    }

    /// Unbinds every connection other than `keep` that holds `slot` of
    /// `session_id`, returning their ids.
    pub fn release_slot(&mut self, session_id: &str, slot: Slot, keep: u32) -> Vec<u32> {
        let mut released = Vec::new();
        for connection in self.connections.values_mut() {
            if connection.id != keep && connection.binding() == Some((session_id, slot)) {
                connection.unbind();
                released.push(connection.id);
            }
        }
        released
    }

    /// Sends one message to a single connection, logging delivery failures
    pub fn send_to(&mut self, conn_id: u32, message: &ServerMessage) {
        if let Some(connection) = self.connections.get_mut(&conn_id) {
            if let Err(e) = connection.send(message) {
                warn!("{}", e);
            }
        }
    }

    /// Fans `message` out to every connection bound to `session_id`
    ///
    /// Serializes once; a failed write to one connection is logged and does
    /// not affect the others. Returns the number of successful deliveries.
    pub fn broadcast_to_session(&mut self, session_id: &str, message: &ServerMessage) -> usize {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to serialize broadcast for game {}: {}", session_id, e);
                return 0;
            }
        };

        let mut delivered = 0;
        for connection in self.connections.values_mut() {
            if !connection.is_bound_to(session_id) {
                continue;
            }
            match connection.send_text(&text) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("{} (game {})", e, session_id),
            }
        }

        debug!("Broadcast to game {} reached {} connections", session_id, delivered);
        delivered
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
