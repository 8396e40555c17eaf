//! Console command parsing and game id handling for the interactive client

use rand::Rng;
use std::str::FromStr;

const GAME_ID_LEN: usize = 6;
const GAME_ID_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Fresh id for a game this player is creating, e.g. `K3ZQ0B`
pub fn new_game_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..GAME_ID_LEN)
        .map(|_| GAME_ID_CHARS[rng.gen_range(0..GAME_ID_CHARS.len())] as char)
        .collect()
}

/// Ids are typed by people, so `abc123 ` and `ABC123` name the same game.
pub fn normalize_game_id(id: &str) -> String {
    id.trim().to_uppercase()
}

/// A line typed by the player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Roll the die, or use a fixed value when one is given (`roll 4`)
    Roll(Option<u8>),
    /// Print the current board
    State,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().map(str::to_ascii_lowercase);

        let command = match verb.as_deref() {
            Some("r") | Some("roll") => match words.next() {
                None => Command::Roll(None),
                Some(value) => {
                    let die = value
                        .parse::<u8>()
                        .map_err(|_| format!("'{}' is not a die value", value))?;
                    Command::Roll(Some(die))
                }
            },
            Some("s") | Some("state") => Command::State,
            Some("q") | Some("quit") | Some("exit") => Command::Quit,
            Some(other) => return Err(format!("unknown command '{}'", other)),
            None => return Err("empty command".to_string()),
        };

        if let Some(extra) = words.next() {
            return Err(format!("unexpected argument '{}'", extra));
        }
        Ok(command)
    }
}

pub const HELP: &str = "Commands: roll [1-6] | state | quit";
