//! Integration tests for the session server and client library
//!
//! These tests boot a real server on an ephemeral port and talk to it over
//! WebSocket connections, either raw or through `client::network::GameClient`.

use futures::{SinkExt, StreamExt};
use server::config::ServerConfig;
use server::gateway::Server;
use server::session_store::SessionStore;
use shared::{ClientMessage, GameState, Player, ServerMessage, Slot, StatePatch};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_PERIOD: Duration = Duration::from_millis(200);

async fn start_server() -> String {
    start_server_with(ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    })
    .await
}

async fn start_server_with(config: ServerConfig) -> String {
    let server = Server::bind(config, SessionStore::new())
        .await
        .expect("Failed to bind server");
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    format!("ws://{}", addr)
}

async fn connect(url: &str) -> Ws {
    let (ws, _) = connect_async(url).await.expect("Failed to connect");
    ws
}

async fn send(ws: &mut Ws, message: &ClientMessage) {
    ws.send(Message::text(message.to_json().unwrap()))
        .await
        .unwrap();
}

async fn send_raw(ws: &mut Ws, text: &str) {
    ws.send(Message::text(text.to_string())).await.unwrap();
}

async fn recv(ws: &mut Ws) -> ServerMessage {
    loop {
        let frame = timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("Timed out waiting for server message")
            .expect("Connection ended")
            .expect("Transport error");
        if let Message::Text(text) = frame {
            return ServerMessage::from_json(text.as_str()).unwrap();
        }
    }
}

async fn recv_state(ws: &mut Ws) -> GameState {
    match recv(ws).await {
        ServerMessage::StateSync { state } => state,
        other => panic!("Expected stateSync, got {:?}", other),
    }
}

async fn recv_error(ws: &mut Ws) -> String {
    match recv(ws).await {
        ServerMessage::ProtocolError { message } => message,
        other => panic!("Expected protocolError, got {:?}", other),
    }
}

async fn assert_silent(ws: &mut Ws) {
    if let Ok(Some(Ok(Message::Text(text)))) = timeout(QUIET_PERIOD, ws.next()).await {
        panic!("Expected no message, got {}", text.as_str());
    }
}

fn join(session_id: &str, name: &str) -> ClientMessage {
    ClientMessage::Join {
        session_id: session_id.to_string(),
        display_name: name.to_string(),
        rejoin_token: None,
    }
}

/// Joins and returns the socket, its slot, its rejoin token, and the first state
async fn join_as(url: &str, session_id: &str, name: &str) -> (Ws, Slot, String, GameState) {
    let mut ws = connect(url).await;
    send(&mut ws, &join(session_id, name)).await;
    let (slot, token) = match recv(&mut ws).await {
        ServerMessage::SlotAssigned { slot, rejoin_token } => (slot, rejoin_token),
        other => panic!("Expected slotAssigned, got {:?}", other),
    };
    let state = recv_state(&mut ws).await;
    (ws, slot, token, state)
}

/// Two players seated in `session_id`, with Alice's copy of Bob's join drained
async fn seated_pair(url: &str, session_id: &str) -> (Ws, Ws) {
    let (mut alice, _, _, _) = join_as(url, session_id, "Alice").await;
    let (bob, _, _, _) = join_as(url, session_id, "Bob").await;
    let _ = recv_state(&mut alice).await;
    (alice, bob)
}

/// SESSION LIFECYCLE TESTS
mod session_tests {
    use super::*;

    #[tokio::test]
    async fn first_join_creates_session_in_slot_a() {
        let url = start_server().await;
        let (_alice, slot, token, state) = join_as(&url, "ABC123", "Alice").await;

        assert_eq!(slot, Slot::A);
        assert_eq!(token.len(), 32);
        assert_eq!(state.game_id, "ABC123");
        assert_eq!(state.red_position, 1);
        assert_eq!(state.blue_position, 1);
        assert_eq!(state.current_player, Player::Player1);
        assert_eq!(state.dice_value, None);
        assert_eq!(state.player1_name, "Alice");
        assert_eq!(state.player2_name, "");
        assert_eq!(state.game_message, "Game started! Alice joined as Player 1");
    }

    #[tokio::test]
    async fn second_join_is_broadcast_to_both() {
        let url = start_server().await;
        let (mut alice, _, _, _) = join_as(&url, "ABC123", "Alice").await;
        let (_bob, slot, _, bob_view) = join_as(&url, "ABC123", "Bob").await;
        let alice_view = recv_state(&mut alice).await;

        assert_eq!(slot, Slot::B);
        assert_eq!(bob_view, alice_view);
        assert_eq!(bob_view.player1_name, "Alice");
        assert_eq!(bob_view.player2_name, "Bob");
        assert_eq!(bob_view.game_message, "Bob joined as Player 2. Game is ready!");
    }

    #[tokio::test]
    async fn third_join_rejected_without_disturbing_players() {
        let url = start_server().await;
        let (mut alice, mut bob) = seated_pair(&url, "ABC123").await;

        let mut carol = connect(&url).await;
        send(&mut carol, &join("ABC123", "Carol")).await;
        assert_eq!(
            recv_error(&mut carol).await,
            "Game ABC123 already has two players"
        );

        assert_silent(&mut alice).await;
        assert_silent(&mut bob).await;

        // Carol's connection is still usable for another game
        send(&mut carol, &join("OTHER", "Carol")).await;
        assert!(matches!(
            recv(&mut carol).await,
            ServerMessage::SlotAssigned { slot: Slot::A, .. }
        ));
    }

    #[tokio::test]
    async fn session_ids_are_case_sensitive() {
        let url = start_server().await;
        let (_alice, _, _, _) = join_as(&url, "abc", "Alice").await;
        let (_bob, slot, _, state) = join_as(&url, "ABC", "Bob").await;

        assert_eq!(slot, Slot::A);
        assert_eq!(state.player1_name, "Bob");
    }
}

/// STATE SYNCHRONIZATION TESTS
mod sync_tests {
    use super::*;

    #[tokio::test]
    async fn action_is_merged_and_broadcast() {
        let url = start_server().await;
        let (mut alice, mut bob) = seated_pair(&url, "ABC123").await;

        let patch = StatePatch {
            red_position: Some(5),
            current_player: Some(Player::Player2),
            dice_value: Some(Some(4)),
            game_message: Some("Alice moved to box 5".to_string()),
            ..Default::default()
        };
        send(&mut alice, &ClientMessage::Action { patch }).await;

        let alice_view = recv_state(&mut alice).await;
        let bob_view = recv_state(&mut bob).await;
        assert_eq!(alice_view, bob_view);
        assert_eq!(alice_view.red_position, 5);
        assert_eq!(alice_view.blue_position, 1);
        assert_eq!(alice_view.current_player, Player::Player2);
        assert_eq!(alice_view.dice_value, Some(4));
        assert_eq!(alice_view.game_message, "Alice moved to box 5");
        assert_eq!(alice_view.player2_name, "Bob");
    }

    #[tokio::test]
    async fn absent_dice_is_kept_and_null_clears_it() {
        let url = start_server().await;
        let (mut alice, mut bob) = seated_pair(&url, "DICE").await;

        send_raw(&mut alice, r#"{"type":"action","patch":{"diceValue":3}}"#).await;
        assert_eq!(recv_state(&mut alice).await.dice_value, Some(3));
        let _ = recv_state(&mut bob).await;

        send_raw(&mut bob, r#"{"type":"action","patch":{"bluePosition":4}}"#).await;
        let state = recv_state(&mut bob).await;
        assert_eq!(state.blue_position, 4);
        assert_eq!(state.dice_value, Some(3));
        let _ = recv_state(&mut alice).await;

        send_raw(&mut alice, r#"{"type":"action","patch":{"diceValue":null}}"#).await;
        assert_eq!(recv_state(&mut alice).await.dice_value, None);
    }

    #[tokio::test]
    async fn broadcasts_stay_within_their_session() {
        let url = start_server().await;
        let (mut alice, _bob) = seated_pair(&url, "ONE").await;
        let (mut carol, _dave) = seated_pair(&url, "TWO").await;

        let patch = StatePatch {
            game_message: Some("hello".to_string()),
            ..Default::default()
        };
        send(&mut carol, &ClientMessage::Action { patch }).await;

        assert_eq!(recv_state(&mut carol).await.game_message, "hello");
        assert_silent(&mut alice).await;
    }

    #[tokio::test]
    async fn actions_are_applied_in_arrival_order() {
        let url = start_server().await;
        let (mut alice, mut bob) = seated_pair(&url, "ORDER").await;

        for position in 2..=10u8 {
            let patch = StatePatch {
                red_position: Some(position),
                ..Default::default()
            };
            send(&mut alice, &ClientMessage::Action { patch }).await;
        }

        for position in 2..=10u8 {
            assert_eq!(recv_state(&mut alice).await.red_position, position);
            assert_eq!(recv_state(&mut bob).await.red_position, position);
        }
    }
}

/// PROTOCOL ERROR TESTS
mod protocol_tests {
    use super::*;

    #[tokio::test]
    async fn action_before_join_is_rejected() {
        let url = start_server().await;
        let mut ws = connect(&url).await;

        send(
            &mut ws,
            &ClientMessage::Action {
                patch: StatePatch::default(),
            },
        )
        .await;
        assert_eq!(recv_error(&mut ws).await, "join a game before sending actions");
    }

    #[tokio::test]
    async fn malformed_message_keeps_connection_open() {
        let url = start_server().await;
        let mut ws = connect(&url).await;

        send_raw(&mut ws, "not json").await;
        assert!(recv_error(&mut ws).await.starts_with("malformed message"));

        send_raw(&mut ws, r#"{"type":"teleport"}"#).await;
        assert!(recv_error(&mut ws).await.starts_with("malformed message"));

        send(&mut ws, &join("AFTER", "Alice")).await;
        assert!(matches!(
            recv(&mut ws).await,
            ServerMessage::SlotAssigned { .. }
        ));
    }

    #[tokio::test]
    async fn empty_names_are_rejected() {
        let url = start_server().await;
        let mut ws = connect(&url).await;

        send(&mut ws, &join("  ", "Alice")).await;
        assert_eq!(
            recv_error(&mut ws).await,
            "invalid join: session id must not be empty"
        );
        send(&mut ws, &join("G", "")).await;
        assert_eq!(
            recv_error(&mut ws).await,
            "invalid join: display name must not be empty"
        );
    }

    #[tokio::test]
    async fn missing_join_field_is_invalid_join() {
        let url = start_server().await;
        let mut ws = connect(&url).await;

        send_raw(&mut ws, r#"{"type":"join","sessionId":"ABC123"}"#).await;
        assert_eq!(
            recv_error(&mut ws).await,
            "invalid join: display name must not be empty"
        );

        // Nothing was created, so a real join still gets slot A
        let (_alice, slot, _, _) = join_as(&url, "ABC123", "Alice").await;
        assert_eq!(slot, Slot::A);
    }

    #[tokio::test]
    async fn second_join_on_same_connection_is_rejected() {
        let url = start_server().await;
        let (mut alice, _, _, _) = join_as(&url, "G", "Alice").await;

        send(&mut alice, &join("H", "Alice")).await;
        assert_eq!(recv_error(&mut alice).await, "already joined game G as slot A");
    }
}

/// RECONNECTION TESTS
mod reconnect_tests {
    use super::*;

    #[tokio::test]
    async fn disconnect_keeps_session_and_rejoin_restores_slot() {
        let url = start_server().await;
        let (mut alice, _, alice_token, _) = join_as(&url, "ABC123", "Alice").await;
        let (mut bob, _, _, _) = join_as(&url, "ABC123", "Bob").await;
        let _ = recv_state(&mut alice).await;

        alice.close(None).await.unwrap();
        drop(alice);

        let patch = StatePatch {
            blue_position: Some(7),
            current_player: Some(Player::Player1),
            ..Default::default()
        };
        send(&mut bob, &ClientMessage::Action { patch }).await;
        assert_eq!(recv_state(&mut bob).await.blue_position, 7);

        let mut alice = connect(&url).await;
        send(
            &mut alice,
            &ClientMessage::Join {
                session_id: "ABC123".to_string(),
                display_name: "Alice".to_string(),
                rejoin_token: Some(alice_token.clone()),
            },
        )
        .await;
        match recv(&mut alice).await {
            ServerMessage::SlotAssigned { slot, rejoin_token } => {
                assert_eq!(slot, Slot::A);
                assert_eq!(rejoin_token, alice_token);
            }
            other => panic!("Expected slotAssigned, got {:?}", other),
        }

        let restored = recv_state(&mut alice).await;
        assert_eq!(restored.blue_position, 7);
        assert_eq!(restored.player1_name, "Alice");
        assert_eq!(recv_state(&mut bob).await, restored);
    }

    #[tokio::test]
    async fn rejoin_with_wrong_token_is_rejected() {
        let url = start_server().await;
        let (_alice, _, _, _) = join_as(&url, "ABC123", "Alice").await;

        let mut mallory = connect(&url).await;
        send(
            &mut mallory,
            &ClientMessage::Join {
                session_id: "ABC123".to_string(),
                display_name: "Alice".to_string(),
                rejoin_token: Some("0".repeat(32)),
            },
        )
        .await;
        let message = recv_error(&mut mallory).await;
        assert!(message.contains("ABC123"));
    }

    #[tokio::test]
    async fn rejoin_supersedes_live_connection() {
        let url = start_server().await;
        let (mut alice, _, token, _) = join_as(&url, "ABC123", "Alice").await;

        let mut second = connect(&url).await;
        send(
            &mut second,
            &ClientMessage::Join {
                session_id: "ABC123".to_string(),
                display_name: "Alice".to_string(),
                rejoin_token: Some(token),
            },
        )
        .await;
        assert!(matches!(
            recv(&mut second).await,
            ServerMessage::SlotAssigned { slot: Slot::A, .. }
        ));
        let _ = recv_state(&mut second).await;

        let _ = recv_error(&mut alice).await;

        // The superseded connection is no longer bound
        send(
            &mut alice,
            &ClientMessage::Action {
                patch: StatePatch::default(),
            },
        )
        .await;
        assert_eq!(recv_error(&mut alice).await, "join a game before sending actions");
    }
}

/// CLIENT LIBRARY TESTS
mod client_tests {
    use super::*;
    use client::game::LocalGame;
    use client::network::{ClientError, GameClient, DEFAULT_JOIN_TIMEOUT};
    use tokio::time::Instant;

    async fn next_state(client: &mut GameClient) -> GameState {
        loop {
            let event = timeout(RECV_TIMEOUT, client.next_event())
                .await
                .expect("Timed out waiting for state")
                .unwrap();
            if let ServerMessage::StateSync { state } = event {
                return state;
            }
        }
    }

    #[tokio::test]
    async fn game_client_plays_a_turn() {
        let url = start_server().await;

        let mut alice = tokio_test::assert_ok!(GameClient::connect(&url).await);
        let ack = tokio_test::assert_ok!(
            alice
                .join("PLAY", "Alice", None, DEFAULT_JOIN_TIMEOUT)
                .await
        );
        let mut alice_game = LocalGame::new(ack.slot, ack.rejoin_token, ack.state);

        let mut bob = GameClient::connect(&url).await.unwrap();
        let ack = bob
            .join("PLAY", "Bob", None, DEFAULT_JOIN_TIMEOUT)
            .await
            .unwrap();
        let mut bob_game = LocalGame::new(ack.slot, ack.rejoin_token, ack.state);
        alice_game.apply(next_state(&mut alice).await);

        assert!(alice_game.is_my_turn());
        assert!(!bob_game.is_my_turn());

        let now = Instant::now();
        alice_game.queue_roll(4, now).unwrap();
        for patch in alice_game.take_due(now) {
            alice.send_action(patch).await.unwrap();
        }

        alice_game.apply(next_state(&mut alice).await);
        bob_game.apply(next_state(&mut bob).await);

        assert_eq!(alice_game.state, bob_game.state);
        assert_eq!(bob_game.state.red_position, 5);
        assert_eq!(bob_game.state.game_message, "Alice moved to box 5");
        assert!(bob_game.is_my_turn());
        assert!(!alice_game.is_busy());
    }

    #[tokio::test]
    async fn game_client_reports_full_session() {
        let url = start_server().await;
        let (_alice, _bob) = seated_pair(&url, "FULL").await;

        let mut carol = GameClient::connect(&url).await.unwrap();
        match carol.join("FULL", "Carol", None, DEFAULT_JOIN_TIMEOUT).await {
            Err(ClientError::Rejected(message)) => {
                assert_eq!(message, "Game FULL already has two players")
            }
            other => panic!("Expected rejection, got {:?}", other),
        }
    }
}

/// EVICTION TESTS
mod eviction_tests {
    use super::*;

    #[tokio::test]
    async fn abandoned_session_is_evicted() {
        let url = start_server_with(ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            idle_timeout_secs: 0,
            sweep_interval_secs: 1,
            ..Default::default()
        })
        .await;

        let (mut alice, _, token, _) = join_as(&url, "GONE", "Alice").await;
        alice.close(None).await.unwrap();
        drop(alice);

        // Let at least one sweep run
        tokio::time::sleep(Duration::from_millis(2500)).await;

        let mut ws = connect(&url).await;
        send(
            &mut ws,
            &ClientMessage::Join {
                session_id: "GONE".to_string(),
                display_name: "Alice".to_string(),
                rejoin_token: Some(token),
            },
        )
        .await;
        assert_eq!(recv_error(&mut ws).await, "unknown session GONE");
    }
}
