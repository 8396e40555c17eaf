//! # Game Session Server Library
//!
//! This library provides the authoritative server for the two-player box race.
//! It keeps the canonical state of every game session, binds exactly two
//! participants to each one, and rebroadcasts the merged state to both of them
//! whenever either submits an update.
//!
//! ## Core Responsibilities
//!
//! ### Session Registry
//! The server owns the only copy of each session's state. Clients never
//! assume their local view is correct: every accepted join or action is
//! answered with the full authoritative state so both players converge on
//! the same board.
//!
//! ### Slot Assignment
//! The first participant to name an unknown session creates it and takes
//! slot A. The second takes slot B and the session becomes ready. A third
//! join is refused without touching the session.
//!
//! ### State Broadcasting
//! Actions are partial state records. The server shallow-merges them into
//! the stored state (keys absent from the action are left alone) and sends
//! the result to every connection bound to that session, including the
//! sender.
//!
//! ## Architecture Design
//!
//! ### Single Dispatcher
//! Every connection runs its own reader and writer task, but all joins,
//! actions, and disconnects are funnelled through one channel into one
//! dispatcher that owns the session store. Messages are applied strictly in
//! arrival order and none is ever partially applied, so two near-simultaneous
//! actions cannot both read the pre-merge state.
//!
//! ### WebSocket Transport
//! Clients connect over a WebSocket upgrade and exchange JSON text frames
//! tagged by `type`. Outbound messages go through a bounded per-connection
//! queue; a slow or dead client loses its own messages and never stalls
//! delivery to anybody else.
//!
//! ### Session Lifetime
//! Disconnecting never deletes a session. A participant holding the rejoin
//! token handed out at join time can reclaim their seat later. Sessions
//! that nobody is connected to are evicted after a configurable idle period.
//!
//! ## Module Organization
//!
//! ### Session Store (`session_store`)
//! Creation, lookup, slot binding, rejoin, merge, and idle eviction. Knows
//! nothing about transports.
//!
//! ### Connection (`connection`)
//! Per-connection protocol state (connected or bound to a session slot) and
//! the table used to fan messages out to a session.
//!
//! ### Gateway (`gateway`)
//! The listener, per-connection tasks, and the dispatcher that translates
//! protocol messages into store operations and broadcasts.
//!
//! ### Configuration and Errors (`config`, `error`)
//! Listener and eviction settings, and the per-message error taxonomy whose
//! text is reported back to clients.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::gateway::Server;
//! use server::session_store::SessionStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let server = Server::bind(ServerConfig::default(), SessionStore::new()).await?;
//!     server.run().await
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod gateway;
pub mod session_store;
