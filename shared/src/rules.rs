//! Turn resolution for the box race.
//!
//! The server never calls into this module: it only merges and rebroadcasts the
//! patches clients submit. Clients call [`roll`] to turn a die value into the
//! ordered list of patches to send, including the delayed follow-up patch
//! produced when a token lands on an explosive box.

use crate::{GameState, Player, StatePatch, BOARD_SIZE, ROW_LENGTH};
use rand::Rng;
use std::time::Duration;
use thiserror::Error;

pub const EXPLOSIVE_BOXES: [u8; 8] = [8, 30, 43, 51, 56, 59, 61, 62];

/// Delay between landing on an explosive box and the teleport patch.
pub const EXPLOSION_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("It's not your turn!")]
    NotYourTurn,
    #[error("the game is already over")]
    GameOver,
    #[error("waiting for the second player")]
    WaitingForOpponent,
    #[error("your last move is still being played")]
    MoveInProgress,
    #[error("die value {0} is outside 1..=6")]
    InvalidDie(u8),
}

/// A patch to submit, after waiting `delay` from the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub patch: StatePatch,
    pub delay: Duration,
}

impl Delta {
    fn now(patch: StatePatch) -> Self {
        Self {
            patch,
            delay: Duration::ZERO,
        }
    }
}

/// Row (1-based, bottom to top) holding `box_number`, or 0 when off the board.
pub fn row_of(box_number: u8) -> u8 {
    if box_number == 0 || box_number > BOARD_SIZE {
        return 0;
    }
    (box_number - 1) / ROW_LENGTH + 1
}

pub fn is_explosive(box_number: u8) -> bool {
    EXPLOSIVE_BOXES.contains(&box_number)
}

/// Box a token is sent back to after exploding in `row`.
pub fn punishment_for_row(row: u8) -> Option<u8> {
    match row {
        1 => Some(1),
        4 => Some(12),
        5 => Some(25),
        6 => Some(22),
        7 => Some(1),
        _ => None,
    }
}

pub fn winner(state: &GameState) -> Option<Player> {
    [Player::Player1, Player::Player2]
        .into_iter()
        .find(|player| state.position_of(*player) == BOARD_SIZE)
}

pub fn roll_die<R: Rng + ?Sized>(rng: &mut R) -> u8 {
    rng.gen_range(1..=6)
}

/// Resolves `me` rolling `die` against `state` into the patches to submit.
pub fn roll(state: &GameState, me: Player, die: u8) -> Result<Vec<Delta>, RuleError> {
    if !(1..=6).contains(&die) {
        return Err(RuleError::InvalidDie(die));
    }
    if winner(state).is_some() {
        return Err(RuleError::GameOver);
    }
    if !state.is_ready() {
        return Err(RuleError::WaitingForOpponent);
    }
    if state.current_player != me {
        return Err(RuleError::NotYourTurn);
    }

    let name = state.name_of(me).to_string();
    let landed = state.position_of(me).saturating_add(die).min(BOARD_SIZE);

    let mut moved = StatePatch {
        dice_value: Some(Some(die)),
        ..Default::default()
    };
    moved.set_position(me, landed);

    if landed == BOARD_SIZE {
        moved.current_player = Some(me.other());
        moved.game_message = Some(format!("{} has won the game!", name));
        return Ok(vec![Delta::now(moved)]);
    }

    if is_explosive(landed) {
        if let Some(target) = punishment_for_row(row_of(landed)) {
            moved.game_message = Some(format!("{} moved to box {}", name, landed));

            let mut teleport = StatePatch {
                current_player: Some(me.other()),
                dice_value: Some(Some(die)),
                game_message: Some(format!(
                    "{} landed on explosive box and moved to box {}!",
                    name, target
                )),
                ..Default::default()
            };
            teleport.set_position(me, target);

            return Ok(vec![
                Delta::now(moved),
                Delta {
                    patch: teleport,
                    delay: EXPLOSION_DELAY,
                },
            ]);
        }
    }

    moved.current_player = Some(me.other());
    moved.game_message = Some(format!("{} moved to box {}", name, landed));
    Ok(vec![Delta::now(moved)])
}
