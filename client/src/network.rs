//! Client connection to the game server with join timeout handling

use futures::{SinkExt, StreamExt};
use log::{debug, info};
use shared::{ClientMessage, GameState, ServerMessage, Slot, StatePatch};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// How long to wait for a seat and the first state after joining.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_millis(5000);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),
    #[error("invalid message: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("no game state received within {0:?}")]
    JoinTimeout(Duration),
    #[error("server rejected request: {0}")]
    Rejected(String),
    #[error("connection closed by server")]
    Closed,
}

/// What the server told us when it seated us
#[derive(Debug, Clone)]
pub struct JoinAck {
    pub slot: Slot,
    pub rejoin_token: String,
    pub state: GameState,
}

pub struct GameClient {
    ws: WsStream,
}

impl GameClient {
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        info!("Connecting to {}", url);
        let (ws, _) = connect_async(url).await?;
        Ok(GameClient { ws })
    }

    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), ClientError> {
        let text = message.to_json()?;
        self.ws.send(Message::text(text)).await?;
        Ok(())
    }

    pub async fn send_action(&mut self, patch: StatePatch) -> Result<(), ClientError> {
        debug!("Sending action {:?}", patch);
        self.send(&ClientMessage::Action { patch }).await
    }

    /// Waits for the next protocol message, skipping transport frames.
    pub async fn next_event(&mut self) -> Result<ServerMessage, ClientError> {
        while let Some(frame) = self.ws.next().await {
            match frame? {
                Message::Text(text) => return Ok(ServerMessage::from_json(text.as_str())?),
                Message::Close(_) => return Err(ClientError::Closed),
                _ => continue,
            }
        }
        Err(ClientError::Closed)
    }

    /// Joins (or rejoins with `rejoin_token`) a session and waits for both the
    /// seat assignment and the first state sync.
    pub async fn join(
        &mut self,
        session_id: &str,
        display_name: &str,
        rejoin_token: Option<String>,
        join_timeout: Duration,
    ) -> Result<JoinAck, ClientError> {
        self.send(&ClientMessage::Join {
            session_id: session_id.to_string(),
            display_name: display_name.to_string(),
            rejoin_token,
        })
        .await?;

        let wait = async {
            let mut seat: Option<(Slot, String)> = None;
            loop {
                match self.next_event().await? {
                    ServerMessage::SlotAssigned { slot, rejoin_token } => {
                        seat = Some((slot, rejoin_token));
                    }
                    ServerMessage::StateSync { state } => {
                        if let Some((slot, rejoin_token)) = seat.take() {
                            return Ok(JoinAck {
                                slot,
                                rejoin_token,
                                state,
                            });
                        }
                    }
                    ServerMessage::ProtocolError { message } => {
                        return Err(ClientError::Rejected(message));
                    }
                }
            }
        };

        match tokio::time::timeout(join_timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::JoinTimeout(join_timeout)),
        }
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.ws.close(None).await?;
        Ok(())
    }
}
