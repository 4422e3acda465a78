//! WebSocket upgrade handler for `/play`

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::controller::Controller;
use crate::game::court::CourtConfig;
use crate::game::input::{InputEvent, PlayerId};
use crate::game::{Registration, SessionError, SessionId};
use crate::util::rate_limit::InputRateLimiter;
use crate::util::time::{unix_micros, Micros};
use crate::ws::protocol::{read_input, ProtocolError, INPUT_FRAME_LEN};

/// Outbound frames buffered per connection before snapshots are dropped
const OUTBOUND_BUFFER: usize = 32;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct PlayQuery {
    /// Session to join, created on first use
    pub id: SessionId,
    /// Seat a bot opponent if this connection creates the session
    pub ai: Option<bool>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<PlayQuery>,
    State(state): State<AppState>,
) -> Response {
    info!(session_id = query.id, ai = query.ai.unwrap_or(false), "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, query, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, query: PlayQuery, state: AppState) {
    let session_id = query.id;
    let with_bot = query.ai.unwrap_or(false);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_BUFFER);

    let registration = match join(&state, session_id, with_bot, outbound_tx).await {
        Ok(registration) => registration,
        Err(e) => {
            warn!(session_id, error = %e, "Could not join session");
            return;
        }
    };
    let player_id = registration.player_id;
    let session = registration.session;
    info!(session_id, player_id, "Player connected");

    let (mut ws_sink, mut ws_stream) = socket.split();

    // Writer task: session snapshots -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = ws_sink.send(Message::Binary(frame)).await {
                debug!(session_id, player_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    let rate_limiter = InputRateLimiter::new(state.config.input_rate_limit);

    // Reader loop: WebSocket -> session
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Binary(frame)) => {
                let event = match classify_frame(&state.court, &frame, player_id, unix_micros()) {
                    InboundFrame::Ignored => continue,
                    InboundFrame::Input(event) => event,
                    InboundFrame::Malformed(e) => {
                        warn!(session_id, player_id, error = %e, "Failed to decode input frame");
                        break;
                    }
                };

                if !rate_limiter.check() {
                    warn!(session_id, player_id, "Rate limited input frame");
                    continue;
                }

                if session.submit_input(event).await.is_err() {
                    debug!(session_id, player_id, "Session closed under connection");
                    break;
                }
            }
            Ok(Message::Text(_)) => {
                debug!(session_id, player_id, "Received text message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(session_id, player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(session_id, player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    session.unregister_player(player_id).await;
    writer_handle.abort();

    info!(session_id, player_id, "WebSocket connection closed");
}

/// Join through the registry, retrying once if the session shut down while
/// the request was queued
async fn join(
    state: &AppState,
    session_id: SessionId,
    with_bot: bool,
    outbound: mpsc::Sender<Vec<u8>>,
) -> Result<Registration, SessionError> {
    let first = state
        .registry
        .join(session_id, Controller::network(outbound.clone()), with_bot)
        .await;

    match first {
        Err(SessionError::Closed(_)) => {
            debug!(session_id, "Session closed during join, retrying");
            state
                .registry
                .join(session_id, Controller::network(outbound), with_bot)
                .await
        }
        other => other,
    }
}

/// What to do with one inbound binary frame
#[derive(Debug, PartialEq)]
enum InboundFrame {
    /// Wrong size; dropped without comment
    Ignored,
    Input(InputEvent),
    /// Correctly sized but undecodable; ends the connection
    Malformed(ProtocolError),
}

fn classify_frame(config: &CourtConfig, frame: &[u8], player_id: PlayerId, now: Micros) -> InboundFrame {
    if frame.len() != INPUT_FRAME_LEN {
        return InboundFrame::Ignored;
    }
    match read_input(config, frame, player_id, now) {
        Ok(event) => InboundFrame::Input(event),
        Err(e) => InboundFrame::Malformed(e),
    }
}
