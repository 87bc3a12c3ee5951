use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::message_models::{Conversation, Message, MessageView, UserId};

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Body of the send endpoint and of every inbound duplex frame.
#[derive(Clone, Debug, Deserialize, Validate, ToSchema)]
pub struct SendMessageRequest {
    #[serde(alias = "receiver_id")]
    #[validate(range(min = 1))]
    pub to: UserId,
    #[validate(length(min = 1))]
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Pagination {
    /// limit <= 0 falls back to the default, anything above the cap is capped,
    /// negative offsets start from the newest message.
    pub fn clamp(limit: i64, offset: i64) -> Self {
        let limit = if limit <= 0 {
            DEFAULT_PAGE_LIMIT
        } else {
            limit.min(MAX_PAGE_LIMIT)
        };

        Self {
            limit,
            offset: offset.max(0),
        }
    }
}

impl From<HistoryQuery> for Pagination {
    fn from(query: HistoryQuery) -> Self {
        Pagination::clamp(query.limit.unwrap_or(DEFAULT_PAGE_LIMIT), query.offset.unwrap_or(0))
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SendMessageResponse {
    pub message: String,
    pub data: Message,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageHistoryResponse {
    pub data: Vec<MessageView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationListResponse {
    pub data: Vec<Conversation>,
}
