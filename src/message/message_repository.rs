use async_trait::async_trait;
use sqlx::PgPool;

use crate::{
    error::{AppError, Result},
    message::{
        message_dto::Pagination,
        message_models::{ordered_pair, Conversation, Message, UserId},
    },
};

/// Durable record of messages and pairwise conversations.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persists a message after checking both users exist. The store assigns
    /// `id` and `created_at`.
    async fn save_message(&self, sender_id: UserId, receiver_id: UserId, content: &str)
        -> Result<Message>;

    /// Messages exchanged between `a` and `b` in either direction, newest first.
    async fn list_messages(
        &self,
        a: UserId,
        b: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>>;

    /// Looks the pair up regardless of order and creates it with an empty last
    /// message if absent. Racing creators end up with the same row.
    async fn get_or_create_conversation(&self, a: UserId, b: UserId) -> Result<Conversation>;

    async fn touch_conversation(&self, conversation_id: i64, last_message: &str) -> Result<()>;

    /// Most recently updated first.
    async fn list_conversations_for_user(&self, user_id: UserId) -> Result<Vec<Conversation>>;
}

/// Rejects what the schema would reject, before touching the database.
pub fn validate_new_message(sender_id: UserId, receiver_id: UserId, content: &str) -> Result<()> {
    if content.is_empty() {
        return Err(AppError::Validation("Message content cannot be empty".to_string()));
    }
    if sender_id == receiver_id {
        return Err(AppError::Validation("Cannot send a message to yourself".to_string()));
    }
    Ok(())
}

#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn user_exists(&self, user_id: UserId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }

    async fn find_conversation(&self, user1_id: UserId, user2_id: UserId) -> Result<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT id, user1_id, user2_id, last_message, updated_at
             FROM conversations
             WHERE user1_id = $1 AND user2_id = $2",
        )
        .bind(user1_id)
        .bind(user2_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conversation)
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    async fn save_message(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        content: &str,
    ) -> Result<Message> {
        validate_new_message(sender_id, receiver_id, content)?;

        if !self.user_exists(sender_id).await? {
            return Err(AppError::NotFound("Sender not found".to_string()));
        }
        if !self.user_exists(receiver_id).await? {
            return Err(AppError::NotFound("Receiver not found".to_string()));
        }

        let message = sqlx::query_as::<_, Message>(
            "INSERT INTO messages (sender_id, receiver_id, content, created_at)
             VALUES ($1, $2, $3, NOW())
             RETURNING id, sender_id, receiver_id, content, created_at",
        )
        .bind(sender_id)
        .bind(receiver_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(message_id = message.id, sender_id, receiver_id, "Message stored");
        Ok(message)
    }

    async fn list_messages(
        &self,
        a: UserId,
        b: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>> {
        let page = Pagination::clamp(limit, offset);

        let messages = sqlx::query_as::<_, Message>(
            "SELECT id, sender_id, receiver_id, content, created_at
             FROM messages
             WHERE (sender_id = $1 AND receiver_id = $2)
                OR (sender_id = $2 AND receiver_id = $1)
             ORDER BY created_at DESC, id DESC
             LIMIT $3 OFFSET $4",
        )
        .bind(a)
        .bind(b)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    async fn get_or_create_conversation(&self, a: UserId, b: UserId) -> Result<Conversation> {
        if a == b {
            return Err(AppError::Validation(
                "A conversation needs two different users".to_string(),
            ));
        }
        let (user1_id, user2_id) = ordered_pair(a, b);

        if let Some(conversation) = self.find_conversation(user1_id, user2_id).await? {
            return Ok(conversation);
        }

        // A concurrent creator may win between the lookup and the insert; the
        // conflict clause turns that into an empty result instead of an error.
        let created = sqlx::query_as::<_, Conversation>(
            "INSERT INTO conversations (user1_id, user2_id, last_message, updated_at)
             VALUES ($1, $2, '', NOW())
             ON CONFLICT (user1_id, user2_id) DO NOTHING
             RETURNING id, user1_id, user2_id, last_message, updated_at",
        )
        .bind(user1_id)
        .bind(user2_id)
        .fetch_optional(&self.pool)
        .await?;

        match created {
            Some(conversation) => {
                tracing::debug!(conversation_id = conversation.id, user1_id, user2_id, "Conversation created");
                Ok(conversation)
            }
            None => self
                .find_conversation(user1_id, user2_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Conversation not found".to_string())),
        }
    }

    async fn touch_conversation(&self, conversation_id: i64, last_message: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE conversations
             SET last_message = $1, updated_at = NOW()
             WHERE id = $2",
        )
        .bind(last_message)
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Conversation not found".to_string()));
        }

        Ok(())
    }

    async fn list_conversations_for_user(&self, user_id: UserId) -> Result<Vec<Conversation>> {
        let conversations = sqlx::query_as::<_, Conversation>(
            "SELECT id, user1_id, user2_id, last_message, updated_at
             FROM conversations
             WHERE user1_id = $1 OR user2_id = $1
             ORDER BY updated_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(conversations)
    }
}
