use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use validator::Validate;

use crate::{
    error::Result,
    extract,
    middleware::AuthUser,
    state::AppState,
    message::{
        message_dto::{
            ConversationListResponse, HistoryQuery, MessageHistoryResponse, Pagination,
            SendMessageRequest, SendMessageResponse,
        },
        message_models::{MessageView, UserId},
    },
};

/// Send a private message to another user
#[utoipa::path(
    post,
    path = "/api/chat/messages",
    tag = "chat",
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message sent successfully", body = SendMessageResponse),
        (status = 400, description = "Empty content, or receiver is the sender"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Receiver not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    extract::Json(payload): extract::Json<SendMessageRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let message = state
        .message_service
        .send_message(user_id, payload.to, &payload.content)
        .await?;

    let response = SendMessageResponse {
        message: "Message sent successfully".to_string(),
        data: message,
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// Get the message history with a specific user, newest first
#[utoipa::path(
    get,
    path = "/api/chat/messages/{user_id}",
    tag = "chat",
    params(
        ("user_id" = i64, Path, description = "The other participant"),
        ("limit" = Option<i64>, Query, description = "Page size (default: 20, max: 100)"),
        ("offset" = Option<i64>, Query, description = "Messages to skip (default: 0)")
    ),
    responses(
        (status = 200, description = "Messages between the caller and the user", body = MessageHistoryResponse),
        (status = 400, description = "Requested history with yourself"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "User not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_conversation_messages(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    extract::Path(other_user_id): extract::Path<UserId>,
    extract::Query(query): extract::Query<HistoryQuery>,
) -> Result<impl IntoResponse> {
    let page = Pagination::from(query);

    let messages = state
        .message_service
        .get_conversation_messages(user_id, other_user_id, page.limit, page.offset)
        .await?;

    let data = messages
        .into_iter()
        .map(|message| MessageView::for_viewer(message, user_id))
        .collect();

    Ok((StatusCode::OK, Json(MessageHistoryResponse { data })))
}

/// Get all conversations of the authenticated user, most recent first
#[utoipa::path(
    get,
    path = "/api/chat/conversations",
    tag = "chat",
    responses(
        (status = 200, description = "List of conversations", body = ConversationListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_conversations(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse> {
    let data = state.message_service.list_conversations(user_id).await?;

    Ok((StatusCode::OK, Json(ConversationListResponse { data })))
}
