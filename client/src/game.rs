use log::debug;
use shared::rules::{self, RuleError};
use shared::{GameState, Player, Slot, StatePatch};
use std::collections::VecDeque;
use tokio::time::Instant;

/// The client's view of one game: the last authoritative state plus any
/// rule patches still waiting to be sent.
#[derive(Debug, Clone)]
pub struct LocalGame {
    pub slot: Slot,
    pub rejoin_token: String,
    pub state: GameState,
    outbox: VecDeque<(Instant, StatePatch)>,
    // Last patch sent, until a state sync shows it merged
    in_flight: Option<StatePatch>,
}

impl LocalGame {
    pub fn new(slot: Slot, rejoin_token: String, state: GameState) -> Self {
        Self {
            slot,
            rejoin_token,
            state,
            outbox: VecDeque::new(),
            in_flight: None,
        }
    }

    /// Replaces the local state with the server's. Local state is never merged.
    ///
    /// A sync caused by the opponent does not release a pending roll; only
    /// one that already contains our last patch does.
    pub fn apply(&mut self, state: GameState) {
        debug!(
            "State sync: red={} blue={} turn={:?}",
            state.red_position, state.blue_position, state.current_player
        );
        if self
            .in_flight
            .as_ref()
            .is_some_and(|patch| state.reflects(patch))
        {
            self.in_flight = None;
        }
        self.state = state;
    }

    pub fn me(&self) -> Player {
        self.slot.player()
    }

    pub fn is_my_turn(&self) -> bool {
        self.state.current_player == self.me()
    }

    /// True while patches from our last roll are queued or not yet echoed back.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some() || !self.outbox.is_empty()
    }

    pub fn winner(&self) -> Option<Player> {
        rules::winner(&self.state)
    }

    /// Resolves a roll and schedules its patches relative to `now`.
    pub fn queue_roll(&mut self, die: u8, now: Instant) -> Result<(), RuleError> {
        if self.is_busy() {
            return Err(RuleError::MoveInProgress);
        }
        let deltas = rules::roll(&self.state, self.me(), die)?;

        let mut due = now;
        for delta in deltas {
            due += delta.delay;
            self.outbox.push_back((due, delta.patch));
        }
        Ok(())
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.outbox.front().map(|(due, _)| *due)
    }

    /// Removes and returns every queued patch due at or before `now`, in order.
    pub fn take_due(&mut self, now: Instant) -> Vec<StatePatch> {
        let mut ready = Vec::new();
        while let Some((due, _)) = self.outbox.front() {
            if *due > now {
                break;
            }
            if let Some((_, patch)) = self.outbox.pop_front() {
                ready.push(patch);
            }
        }
        if let Some(last) = ready.last() {
            self.in_flight = Some(last.clone());
        }
        ready
    }

    /// Drops anything still queued after the server refused one of our patches.
    pub fn abandon_roll(&mut self) {
        self.outbox.clear();
        self.in_flight = None;
    }

    pub fn status_line(&self) -> String {
        let state = &self.state;
        let opponent = if state.player2_name.is_empty() {
            "(waiting)"
        } else {
            state.player2_name.as_str()
        };
        let dice = state
            .dice_value
            .map(|value| value.to_string())
            .unwrap_or_else(|| "-".to_string());

        format!(
            "[{}] red {} @ {} | blue {} @ {} | dice {} | turn {:?} | {}",
            state.game_id,
            state.player1_name,
            state.red_position,
            opponent,
            state.blue_position,
            dice,
            state.current_player,
            state.game_message
        )
    }
}
