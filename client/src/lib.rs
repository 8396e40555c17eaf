//! # Game Client Library
//!
//! This library provides the client side of the two-player box race. It
//! connects to the session server over a WebSocket, joins or rejoins a game,
//! turns die rolls into state patches using the shared rules, and keeps a
//! local copy of whatever state the server last broadcast.
//!
//! ## Architecture Overview
//!
//! ### Server Authority
//! The client never merges its own patches into its local state. It sends a
//! patch and waits: the next `stateSync` from the server is the only thing
//! that moves tokens on screen. Both players therefore always render the
//! same board, even when their actions race each other.
//!
//! ### Rules on the Client
//! Turn resolution (moving, explosive boxes, winning) lives in
//! `shared::rules` and runs on the rolling player's machine. The server only
//! stores and relays the resulting patches.
//!
//! ### Delayed Patches
//! Landing on an explosive box produces two patches: the landing itself and,
//! one second later, the teleport to the punishment box. The second patch is
//! held in a small outbox and sent when it falls due. No new roll is accepted
//! while anything is still queued.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! - WebSocket connection to the server
//! - Join handshake with a bounded wait for the first state
//! - Sending actions and receiving server messages
//!
//! ### Game Module (`game`)
//! - Last authoritative state and our slot
//! - Turn checks and the pending patch outbox
//! - One-line board summary for the console
//!
//! ### Input Module (`input`)
//! Parses console commands such as `roll`, `roll 4`, `state` and `quit`,
//! and mints or normalizes the 6-character game ids players share.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::game::LocalGame;
//! use client::network::{GameClient, DEFAULT_JOIN_TIMEOUT};
//! use shared::ServerMessage;
//!
//! # async fn play() -> Result<(), client::network::ClientError> {
//! let mut client = GameClient::connect("ws://127.0.0.1:3000").await?;
//! let ack = client.join("ABC123", "Alice", None, DEFAULT_JOIN_TIMEOUT).await?;
//! let mut game = LocalGame::new(ack.slot, ack.rejoin_token, ack.state);
//!
//! loop {
//!     if let ServerMessage::StateSync { state } = client.next_event().await? {
//!         game.apply(state);
//!         println!("{}", game.status_line());
//!     }
//! }
//! # }
//! ```

pub mod game;
pub mod input;
pub mod network;
