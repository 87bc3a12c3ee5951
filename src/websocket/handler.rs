use axum::{
    extract::{ws::WebSocket, State, WebSocketUpgrade},
    response::Response,
};
use futures::StreamExt;

use crate::{message::UserId, middleware::AuthUser, state::AppState};

use super::session::DuplexSession;

/// Duplex chat endpoint.
///
/// Inbound text frames are `{"to": <user id>, "content": "..."}` and go through
/// the same pipeline as `POST /api/chat/messages`. Outbound frames are
/// `{"type": "message", "data": Message}` for every message on any of the
/// caller's pairs, and `{"type": "error", "data": {"error": "..."}}` when one of
/// the caller's own sends fails.
///
/// A second connection for the same user replaces the first.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

async fn handle_socket(socket: WebSocket, user_id: UserId, state: AppState) {
    let (sender, receiver) = socket.split();

    let session = DuplexSession::new(
        user_id,
        state.message_service.clone(),
        state.ws_connections.clone(),
        state.config.session_config(),
    );
    session.run(sender, receiver).await;
}
