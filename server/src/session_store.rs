//! Session registry and slot arbitration for two-player games
//!
//! This module is the single source of truth for every game session the
//! server knows about. It handles:
//! - Session creation on the first join to an unknown id
//! - Binding the second participant and refusing a third
//! - Shallow-merging client patches into the authoritative state
//! - Rejoin tokens so a returning participant gets their old seat back
//! - Idle eviction of sessions nobody is connected to
//!
//! The store knows nothing about transports. Callers are responsible for
//! telling connections about the results of these operations.

use log::info;
use rand::Rng;
use shared::{GameState, Slot, StatePatch};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::SyncError;

/// A participant bound to one seat of a session
///
/// Display names are not unique and carry no identity. The rejoin token is
/// the only thing that lets a reconnecting client reclaim this seat.
#[derive(Debug, Clone)]
pub struct Participant {
    pub display_name: String,
    rejoin_token: String,
}

impl Participant {
    fn new(display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            rejoin_token: mint_token(),
        }
    }

    pub fn rejoin_token(&self) -> &str {
        &self.rejoin_token
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Waiting,
    Ready,
}

/// One game instance: two seats and the shared state record
///
/// Slot A is bound at creation and never unbound, so it is stored
/// directly. Slot B is empty until the second participant arrives.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    slot_a: Participant,
    slot_b: Option<Participant>,
    pub state: GameState,
    pub created_at: Instant,
    pub last_active: Instant,
}

impl Session {
    fn new(id: &str, creator: &str) -> Self {
        let now = Instant::now();
        Self {
            id: id.to_string(),
            slot_a: Participant::new(creator),
            slot_b: None,
            state: GameState::new(id, creator),
            created_at: now,
            last_active: now,
        }
    }

    pub fn participant(&self, slot: Slot) -> Option<&Participant> {
        match slot {
            Slot::A => Some(&self.slot_a),
            Slot::B => self.slot_b.as_ref(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        if self.slot_b.is_some() {
            SessionPhase::Ready
        } else {
            SessionPhase::Waiting
        }
    }

    /// Returns true if the session has seen no activity within `timeout`
    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.last_active.elapsed() > timeout
    }

    fn slot_for_token(&self, token: &str) -> Option<Slot> {
        [Slot::A, Slot::B].into_iter().find(|slot| {
            self.participant(*slot)
                .is_some_and(|participant| participant.rejoin_token == token)
        })
    }

    fn admit(&self, slot: Slot, is_new_session: bool) -> Joined {
        let rejoin_token = self
            .participant(slot)
            .map(|participant| participant.rejoin_token.clone())
            .unwrap_or_default();

        Joined {
            slot,
            is_new_session,
            rejoin_token,
            state: self.state.clone(),
        }
    }
}

/// Result of a successful join or rejoin
#[derive(Debug, Clone)]
pub struct Joined {
    pub slot: Slot,
    pub is_new_session: bool,
    pub rejoin_token: String,
    /// Full session state after the join was applied
    pub state: GameState,
}

/// Registry of all live sessions keyed by their client-chosen id
///
/// The store is owned by exactly one dispatcher, so every operation runs
/// to completion before the next one starts and read-merge-write of a
/// session can never interleave with another mutation.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Binds `display_name` to a seat of `session_id`
    ///
    /// Creates the session with the caller in slot A if the id is unknown,
    /// binds slot B if the session is waiting, and fails with
    /// `SessionFull` without touching anything otherwise.
    pub fn create_or_join(
        &mut self,
        session_id: &str,
        display_name: &str,
    ) -> Result<Joined, SyncError> {
        match self.sessions.get_mut(session_id) {
            None => {
                let session = Session::new(session_id, display_name);
                let joined = session.admit(Slot::A, true);
                self.sessions.insert(session_id.to_string(), session);
                info!("Created game {} with player {}", session_id, display_name);
                Ok(joined)
            }
            Some(session) if session.phase() == SessionPhase::Waiting => {
                session.slot_b = Some(Participant::new(display_name));
                session.state.seat_second_player(display_name);
                session.last_active = Instant::now();
                info!("Player {} joined game {} as slot B", display_name, session_id);
                Ok(session.admit(Slot::B, false))
            }
            Some(_) => Err(SyncError::SessionFull {
                session_id: session_id.to_string(),
            }),
        }
    }

    /// Hands the seat owning `token` back to a returning participant
    ///
    /// The display name and state are left as they are; only the
    /// session's activity clock moves.
    pub fn rejoin(&mut self, session_id: &str, token: &str) -> Result<Joined, SyncError> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| SyncError::UnknownSession {
                session_id: session_id.to_string(),
            })?;

        let slot = session
            .slot_for_token(token)
            .ok_or_else(|| SyncError::InvalidRejoinToken {
                session_id: session_id.to_string(),
            })?;

        session.last_active = Instant::now();
        info!("Participant rejoined game {} in slot {}", session_id, slot);
        Ok(session.admit(slot, false))
    }

    /// Shallow-merges `patch` into the session's state
    ///
    /// Returns the full post-merge state for broadcast, or None if the
    /// session does not exist, in which case nothing must be broadcast.
    pub fn apply_update(&mut self, session_id: &str, patch: &StatePatch) -> Option<GameState> {
        let session = self.sessions.get_mut(session_id)?;
        session.state.merge(patch);
        session.last_active = Instant::now();
        Some(session.state.clone())
    }

    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    /// Restarts the idle clock of a session, e.g. when its last connection leaves
    pub fn touch(&mut self, session_id: &str) {
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.last_active = Instant::now();
        }
    }

    /// Removes sessions that are idle and unattended
    ///
    /// A session is evicted when `is_attended` reports no bound connection
    /// for it and its last activity is older than `idle_timeout`. Returns
    /// the evicted ids.
    pub fn evict_idle<F>(&mut self, idle_timeout: Duration, is_attended: F) -> Vec<String>
    where
        F: Fn(&str) -> bool,
    {
        let evicted: Vec<String> = self
            .sessions
            .values()
            .filter(|session| session.is_idle(idle_timeout) && !is_attended(&session.id))
            .map(|session| session.id.clone())
            .collect();

        for session_id in &evicted {
            if let Some(session) = self.sessions.remove(session_id) {
                info!(
                    "Evicted idle game {} after {:?}",
                    session_id,
                    session.created_at.elapsed()
                );
            }
        }

        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn mint_token() -> String {
    let mut rng = rand::thread_rng();
    format!("{:016x}{:016x}", rng.gen::<u64>(), rng.gen::<u64>())
}
