use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub mod rules;

pub const BOARD_SIZE: u8 = 63;
pub const ROW_LENGTH: u8 = 9;
pub const START_BOX: u8 = 1;

/// One of the two fixed seats in a session. `A` always belongs to the creator.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub fn player(self) -> Player {
        match self {
            Slot::A => Player::Player1,
            Slot::B => Player::Player2,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::A => write!(f, "A"),
            Slot::B => write!(f, "B"),
        }
    }
}

/// Turn owner as it appears in the game state.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Player {
    Player1,
    Player2,
}

impl Player {
    pub fn other(self) -> Self {
        match self {
            Player::Player1 => Player::Player2,
            Player::Player2 => Player::Player1,
        }
    }

    pub fn slot(self) -> Slot {
        match self {
            Player::Player1 => Slot::A,
            Player::Player2 => Slot::B,
        }
    }
}

/// Authoritative state of one session, broadcast whole on every `stateSync`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub game_id: String,
    pub red_position: u8,
    pub blue_position: u8,
    pub current_player: Player,
    pub dice_value: Option<u8>,
    pub game_message: String,
    pub player1_name: String,
    pub player2_name: String,
}

impl GameState {
    pub fn new(game_id: &str, player1_name: &str) -> Self {
        Self {
            game_id: game_id.to_string(),
            red_position: START_BOX,
            blue_position: START_BOX,
            current_player: Player::Player1,
            dice_value: None,
            game_message: format!("Game started! {} joined as Player 1", player1_name),
            player1_name: player1_name.to_string(),
            player2_name: String::new(),
        }
    }

    pub fn seat_second_player(&mut self, player2_name: &str) {
        self.player2_name = player2_name.to_string();
        self.game_message = format!("{} joined as Player 2. Game is ready!", player2_name);
    }

    /// Shallow merge: every field present in `patch` overwrites the stored one,
    /// absent fields are left untouched.
    pub fn merge(&mut self, patch: &StatePatch) {
        if let Some(position) = patch.red_position {
            self.red_position = position;
        }
        if let Some(position) = patch.blue_position {
            self.blue_position = position;
        }
        if let Some(player) = patch.current_player {
            self.current_player = player;
        }
        if let Some(dice) = patch.dice_value {
            self.dice_value = dice;
        }
        if let Some(message) = &patch.game_message {
            self.game_message = message.clone();
        }
    }

    /// True when merging `patch` would change nothing.
    pub fn reflects(&self, patch: &StatePatch) -> bool {
        let mut merged = self.clone();
        merged.merge(patch);
        merged == *self
    }

    pub fn position_of(&self, player: Player) -> u8 {
        match player {
            Player::Player1 => self.red_position,
            Player::Player2 => self.blue_position,
        }
    }

    pub fn name_of(&self, player: Player) -> &str {
        match player {
            Player::Player1 => &self.player1_name,
            Player::Player2 => &self.player2_name,
        }
    }

    pub fn is_ready(&self) -> bool {
        !self.player2_name.is_empty()
    }
}

/// Partial update submitted by a client. `dice_value` distinguishes an absent
/// key (`None`) from an explicit `null` (`Some(None)`).
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub red_position: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blue_position: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_player: Option<Player>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_or_null"
    )]
    pub dice_value: Option<Option<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_message: Option<String>,
}

impl StatePatch {
    pub fn is_empty(&self) -> bool {
        *self == StatePatch::default()
    }

    pub fn set_position(&mut self, player: Player, position: u8) {
        match player {
            Player::Player1 => self.red_position = Some(position),
            Player::Player2 => self.blue_position = Some(position),
        }
    }
}

fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Missing and null strings both read as empty, leaving validation to the gateway.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Messages a client sends to the gateway.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Join {
        #[serde(default, deserialize_with = "null_as_empty")]
        session_id: String,
        #[serde(default, deserialize_with = "null_as_empty")]
        display_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rejoin_token: Option<String>,
    },
    Action {
        patch: StatePatch,
    },
}

impl ClientMessage {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Messages the gateway sends to a client.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    SlotAssigned { slot: Slot, rejoin_token: String },
    StateSync { state: GameState },
    ProtocolError { message: String },
}

impl ServerMessage {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
