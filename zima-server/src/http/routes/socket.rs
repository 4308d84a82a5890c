//! Live document socket
//!
//! Each connection runs one `select!` loop over inbound frames and the
//! broadcast channel of rendered fragments.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::{routing::get, Router};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::Instrument;
use uuid::Uuid;
use zima_widgets::protocol::{ClientMessage, ServerMessage};

use crate::state::AppState;

/// GET /ws
async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(socket: WebSocket, state: AppState) {
    let span = tracing::info_span!("socket", connection = %Uuid::new_v4());
    async move {
        let (mut sender, mut receiver) = socket.split();
        let mut updates = state.subscribe();
        tracing::info!("socket connected");

        loop {
            tokio::select! {
                inbound = receiver.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let message = match ClientMessage::from_frame(text.as_str()) {
                            Ok(message) => message,
                            Err(e) => {
                                tracing::warn!(error = %e, "ignoring malformed frame");
                                continue;
                            }
                        };
                        tracing::debug!(event = message.name(), "client message");
                        if let Some(reply) = handle_client_message(&state, message).await {
                            if send(&mut sender, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "socket receive failed");
                        break;
                    }
                },
                update = updates.recv() => {
                    let html = match update {
                        Ok(html) => html,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "socket lagged, resending current render");
                            state.render().await
                        }
                        Err(RecvError::Closed) => break,
                    };
                    if send(&mut sender, &ServerMessage::Update(html)).await.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("socket disconnected");
    }
    .instrument(span)
    .await
}

async fn send(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let frame = match message.to_frame() {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(event = message.name(), error = %e, "could not encode frame");
            return Ok(());
        }
    };
    sender.send(Message::Text(frame.into())).await
}

/// Apply one client message; some messages are answered directly.
pub(crate) async fn handle_client_message(
    state: &AppState,
    message: ClientMessage,
) -> Option<ServerMessage> {
    match message {
        ClientMessage::RunCell { cell_id } => {
            if let Err(e) = state.spawn_cell(&cell_id).await {
                tracing::warn!(cell_id = %cell_id, error = %e, "run request rejected");
            }
            None
        }
        ClientMessage::SaveCode { cell_id, content } => match state.save_code(&cell_id, &content).await {
            Ok(()) => {
                tracing::debug!(cell_id = %cell_id, "cell code saved");
                Some(ServerMessage::CodeSaved { cell_id })
            }
            Err(e) => {
                tracing::warn!(cell_id = %cell_id, error = %e, "could not save cell code");
                None
            }
        },
        ClientMessage::Keydown { key } => {
            tracing::debug!(key = %key, "key pressed");
            None
        }
        ClientMessage::Loaded {} => Some(ServerMessage::Update(state.render().await)),
    }
}

/// Socket routes
pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(upgrade))
}
