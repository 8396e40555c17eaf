//! Synchronization gateway: WebSocket transport and the single dispatcher loop

use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionTable};
use crate::error::SyncError;
use crate::session_store::SessionStore;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientMessage, ServerMessage, StatePatch};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;

/// Messages sent from connection tasks to the dispatcher
#[derive(Debug)]
pub enum GatewayEvent {
    Connected {
        conn_id: u32,
        addr: SocketAddr,
        sender: mpsc::Sender<Message>,
    },
    Frame {
        conn_id: u32,
        message: Message,
    },
    Disconnected {
        conn_id: u32,
    },
}

/// Owns the session store and the connection table, and applies events to
/// them one at a time
pub struct Dispatcher {
    store: SessionStore,
    connections: ConnectionTable,
    idle_timeout: Duration,
}

impl Dispatcher {
    pub fn new(store: SessionStore, idle_timeout: Duration) -> Self {
        Dispatcher {
            store,
            connections: ConnectionTable::new(),
            idle_timeout,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    pub fn handle_event(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::Connected {
                conn_id,
                addr,
                sender,
            } => {
                self.connections
                    .insert(Connection::new(conn_id, addr, sender));
            }
            GatewayEvent::Frame { conn_id, message } => {
                self.handle_frame(conn_id, message);
            }
            GatewayEvent::Disconnected { conn_id } => {
                self.handle_disconnect(conn_id);
            }
        }
    }

    fn handle_frame(&mut self, conn_id: u32, message: Message) {
        if self.connections.get(conn_id).is_none() {
            warn!("Frame from unknown connection {}", conn_id);
            return;
        }

        let text = match message {
            Message::Text(text) => text,
            Message::Binary(_) => {
                self.reject(
                    conn_id,
                    SyncError::Malformed("binary frames are not supported".to_string()),
                );
                return;
            }
            _ => return,
        };

        match ClientMessage::from_json(text.as_str()) {
            Ok(ClientMessage::Join {
                session_id,
                display_name,
                rejoin_token,
            }) => self.handle_join(conn_id, &session_id, &display_name, rejoin_token.as_deref()),
            Ok(ClientMessage::Action { patch }) => self.handle_action(conn_id, &patch),
            Err(e) => self.reject(conn_id, SyncError::Malformed(e.to_string())),
        }
    }

    /// Connected -> Bound
    fn handle_join(
        &mut self,
        conn_id: u32,
        session_id: &str,
        display_name: &str,
        rejoin_token: Option<&str>,
    ) {
        let already = self
            .connections
            .get(conn_id)
            .and_then(|connection| connection.binding())
            .map(|(bound, slot)| SyncError::AlreadyJoined {
                session_id: bound.to_string(),
                slot,
            });
        if let Some(err) = already {
            self.reject(conn_id, err);
            return;
        }

        if session_id.trim().is_empty() {
            self.reject(conn_id, SyncError::InvalidJoin("session id must not be empty"));
            return;
        }
        if display_name.trim().is_empty() {
            self.reject(conn_id, SyncError::InvalidJoin("display name must not be empty"));
            return;
        }

        info!("Player {} is joining game {}", display_name, session_id);

        let result = match rejoin_token {
            Some(token) => self.store.rejoin(session_id, token),
            None => self.store.create_or_join(session_id, display_name),
        };

        let joined = match result {
            Ok(joined) => joined,
            Err(e) => {
                info!("Failed join attempt on game {}: {}", session_id, e);
                self.reject(conn_id, e);
                return;
            }
        };

        if let Some(connection) = self.connections.get_mut(conn_id) {
            connection.bind(session_id, joined.slot);
        }

        for stale in self.connections.release_slot(session_id, joined.slot, conn_id) {
            self.reject(
                stale,
                SyncError::Superseded {
                    session_id: session_id.to_string(),
                    slot: joined.slot,
                },
            );
        }

        self.connections.send_to(
            conn_id,
            &ServerMessage::SlotAssigned {
                slot: joined.slot,
                rejoin_token: joined.rejoin_token,
            },
        );
        self.connections.broadcast_to_session(
            session_id,
            &ServerMessage::StateSync {
                state: joined.state,
            },
        );
    }

    fn handle_action(&mut self, conn_id: u32, patch: &StatePatch) {
        let session_id = match self
            .connections
            .get(conn_id)
            .and_then(|connection| connection.binding())
        {
            Some((session_id, _)) => session_id.to_string(),
            None => {
                self.reject(conn_id, SyncError::NotJoined);
                return;
            }
        };

        debug!("Game action in {}: {:?}", session_id, patch);

        match self.store.apply_update(&session_id, patch) {
            Some(state) => {
                self.connections
                    .broadcast_to_session(&session_id, &ServerMessage::StateSync { state });
            }
            None => {
                warn!("Dropped action: {}", SyncError::UnknownSession { session_id });
            }
        }
    }

    // Bookkeeping only; the session's state stays as it is
    fn handle_disconnect(&mut self, conn_id: u32) {
        if let Some(connection) = self.connections.remove(conn_id) {
            if let Some((session_id, slot)) = connection.binding() {
                info!("Slot {} of game {} is now unattended", slot, session_id);
                self.store.touch(session_id);
            }
        }
    }

    /// Evicts sessions that are idle and have no bound connection
    pub fn sweep(&mut self) -> Vec<String> {
        let connections = &self.connections;
        self.store
            .evict_idle(self.idle_timeout, |session_id| connections.is_attended(session_id))
    }

    fn reject(&mut self, conn_id: u32, err: SyncError) {
        warn!("Protocol error on connection {}: {}", conn_id, err);
        self.connections.send_to(
            conn_id,
            &ServerMessage::ProtocolError {
                message: err.to_string(),
            },
        );
    }
}

/// Listener plus dispatcher; one process hosts exactly one of these
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    dispatcher: Dispatcher,
}

impl Server {
    pub async fn bind(
        config: ServerConfig,
        store: SessionStore,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(config.address()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let dispatcher = Dispatcher::new(store, config.idle_timeout());
        Ok(Server {
            listener,
            config,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawns task that accepts TCP connections and upgrades them
    fn spawn_acceptor(
        listener: TcpListener,
        events: mpsc::UnboundedSender<GatewayEvent>,
        queue: usize,
    ) {
        tokio::spawn(async move {
            let mut next_conn_id: u32 = 1;

            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let conn_id = next_conn_id;
                        next_conn_id = next_conn_id.wrapping_add(1);
                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            conn_id,
                            events.clone(),
                            queue,
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Main loop: every join, action, and disconnect goes through here in
    /// arrival order
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let Server {
            listener,
            config,
            mut dispatcher,
        } = self;

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        Self::spawn_acceptor(listener, event_tx, config.outbound_queue.max(1));

        let mut sweep_interval = interval(config.sweep_interval());
        sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Skip the first tick since it fires immediately
        sweep_interval.tick().await;

        info!("Server started successfully");

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Some(event) => dispatcher.handle_event(event),
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = sweep_interval.tick() => {
                    let evicted = dispatcher.sweep();
                    if !evicted.is_empty() {
                        debug!(
                            "Sweep evicted {} games, {} remain, {} connections",
                            evicted.len(),
                            dispatcher.store().len(),
                            dispatcher.connections().len()
                        );
                    }
                },
            }
        }

        Ok(())
    }
}

/// Runs one WebSocket connection: a reader forwarding frames to the
/// dispatcher and a writer draining the connection's outbound queue
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    conn_id: u32,
    events: mpsc::UnboundedSender<GatewayEvent>,
    queue: usize,
) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let (mut sink, mut frames) = ws_stream.split();
    let (tx, mut rx) = mpsc::channel::<Message>(queue);

    if events
        .send(GatewayEvent::Connected {
            conn_id,
            addr,
            sender: tx,
        })
        .is_err()
    {
        error!("Dispatcher is gone, dropping connection from {}", addr);
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = sink.send(message).await {
                debug!("Write to connection {} failed: {}", conn_id, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = frames.next().await {
        match frame {
            Ok(Message::Close(_)) => break,
            Ok(message @ (Message::Text(_) | Message::Binary(_))) => {
                if events.send(GatewayEvent::Frame { conn_id, message }).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                debug!("Read from connection {} failed: {}", conn_id, e);
                break;
            }
        }
    }

    let _ = events.send(GatewayEvent::Disconnected { conn_id });
    writer.abort();
}
