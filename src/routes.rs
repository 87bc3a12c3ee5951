use crate::{
    message::{
        message_dto::{
            ConversationListResponse, MessageHistoryResponse, SendMessageRequest,
            SendMessageResponse,
        },
        message_handlers,
        message_models::{Conversation, Message, MessageView},
    },
    middleware::auth_middleware,
    state::AppState,
    websocket::ws_handler,
};
use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use axum::http::{header::{AUTHORIZATION, CONTENT_TYPE}, Method};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::message::message_handlers::send_message,
        crate::message::message_handlers::get_conversation_messages,
        crate::message::message_handlers::get_conversations,
    ),
    components(
        schemas(
            SendMessageRequest,
            SendMessageResponse,
            MessageHistoryResponse,
            ConversationListResponse,
            Message,
            MessageView,
            Conversation,
        )
    ),
    tags(
        (name = "chat", description = "Private messaging endpoints")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            )
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    // Protected routes (auth required)
    let chat_routes = Router::new()
        .route("/messages", post(message_handlers::send_message))
        .route("/messages/:user_id", get(message_handlers::get_conversation_messages))
        .route("/conversations", get(message_handlers::get_conversations))
        .route("/ws", get(ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api/chat", chat_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
