use clap::Parser;
use client::game::LocalGame;
use client::input::{new_game_id, normalize_game_id, Command, HELP};
use client::network::{ClientError, GameClient};
use log::{info, warn};
use shared::rules::roll_die;
use shared::ServerMessage;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{sleep_until, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server URL to connect to
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:3000")]
    server: String,

    /// Game id to join; a new game with a random id is created when omitted
    #[arg(short = 'g', long)]
    game: Option<String>,

    /// Name shown to the other player
    #[arg(short = 'n', long)]
    name: String,

    /// Token from an earlier join, to reclaim the same seat
    #[arg(long, requires = "game")]
    rejoin_token: Option<String>,

    /// Milliseconds to wait for the first game state after joining
    #[arg(long, default_value = "5000")]
    join_timeout_ms: u64,

    /// Roll automatically whenever it is our turn
    #[arg(long)]
    auto: bool,
}

fn try_roll(game: &mut LocalGame, die: Option<u8>) {
    let die = die.unwrap_or_else(|| roll_die(&mut rand::thread_rng()));
    match game.queue_roll(die, Instant::now()) {
        Ok(()) => info!("Rolled {}", die),
        Err(e) => println!("{}", e),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let game_id = match &args.game {
        Some(id) => normalize_game_id(id),
        None => {
            let id = new_game_id(&mut rand::thread_rng());
            println!("Created game {}. Share this id with your opponent.", id);
            id
        }
    };

    let mut client = GameClient::connect(&args.server).await?;
    let ack = client
        .join(
            &game_id,
            &args.name,
            args.rejoin_token.clone(),
            Duration::from_millis(args.join_timeout_ms),
        )
        .await?;

    println!(
        "Joined game {} as slot {} ({:?})",
        game_id,
        ack.slot,
        ack.slot.player()
    );
    println!("Rejoin token: {}", ack.rejoin_token);

    let mut game = LocalGame::new(ack.slot, ack.rejoin_token, ack.state);
    println!("{}", game.status_line());
    if !args.auto {
        println!("{}", HELP);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        if args.auto && !game.is_busy() {
            if game.winner().is_some() {
                break;
            }
            if game.is_my_turn() && game.state.is_ready() {
                try_roll(&mut game, None);
            }
        }

        let due = game.next_due();

        tokio::select! {
            event = client.next_event() => match event {
                Ok(ServerMessage::StateSync { state }) => {
                    game.apply(state);
                    println!("{}", game.status_line());
                    if let Some(winner) = game.winner() {
                        println!("{:?} has won.", winner);
                    }
                }
                Ok(ServerMessage::ProtocolError { message }) => {
                    warn!("Server error: {}", message);
                    game.abandon_roll();
                    println!("Server error: {}", message);
                }
                Ok(ServerMessage::SlotAssigned { slot, .. }) => {
                    info!("Unexpected slot assignment {}", slot);
                }
                Err(ClientError::Closed) => {
                    println!("Server closed the connection");
                    break;
                }
                Err(e) => return Err(e.into()),
            },
            line = lines.next_line(), if !args.auto => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match line.parse::<Command>() {
                    Ok(Command::Roll(die)) => try_roll(&mut game, die),
                    Ok(Command::State) => println!("{}", game.status_line()),
                    Ok(Command::Quit) => break,
                    Err(e) => println!("{}. {}", e, HELP),
                },
                None => break,
            },
            _ = sleep_until(due.unwrap_or_else(Instant::now)), if due.is_some() => {
                for patch in game.take_due(Instant::now()) {
                    client.send_action(patch).await?;
                }
            }
        }
    }

    info!("Leaving game {}", game_id);
    client.close().await?;
    Ok(())
}
