//! Failures scoped to a single connection or a single message.
//!
//! Nothing here is fatal to the process. The `Display` text of a variant is the
//! message a client receives in a `protocolError`.

use shared::Slot;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("invalid join: {0}")]
    InvalidJoin(&'static str),

    #[error("Game {session_id} already has two players")]
    SessionFull { session_id: String },

    #[error("unknown session {session_id}")]
    UnknownSession { session_id: String },

    #[error("join a game before sending actions")]
    NotJoined,

    #[error("already joined game {session_id} as slot {slot}")]
    AlreadyJoined { session_id: String, slot: Slot },

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("rejoin token does not match a seat in game {session_id}")]
    InvalidRejoinToken { session_id: String },

    #[error("slot {slot} of game {session_id} was taken over by another connection")]
    Superseded { session_id: String, slot: Slot },

    #[error("failed to deliver message to connection {conn_id}")]
    Delivery { conn_id: u32 },
}
