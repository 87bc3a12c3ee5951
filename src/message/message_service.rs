use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    broker::{BrokerBridge, Subscription},
    error::{AppError, Result},
    message::{
        message_dto::Pagination,
        message_models::{Conversation, Message, UserId},
        message_repository::MessageStore,
    },
    user::UserDirectory,
};

/// The one place where storage and broker are sequenced.
#[derive(Clone)]
pub struct MessageService {
    store: Arc<dyn MessageStore>,
    users: Arc<dyn UserDirectory>,
    broker: Arc<BrokerBridge>,
}

impl MessageService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        users: Arc<dyn UserDirectory>,
        broker: Arc<BrokerBridge>,
    ) -> Self {
        Self {
            store,
            users,
            broker,
        }
    }

    /// Validates, persists, updates the pair's conversation and publishes for
    /// live delivery.
    ///
    /// The message row and the conversation update are separate writes: if the
    /// conversation step fails the call fails, and the already stored message
    /// stays behind. Publishing is best-effort and never fails the call.
    pub async fn send_message(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        content: &str,
    ) -> Result<Message> {
        if content.is_empty() {
            return Err(AppError::Validation("Message content cannot be empty".to_string()));
        }
        if sender_id == receiver_id {
            return Err(AppError::Validation("Cannot send a message to yourself".to_string()));
        }
        if receiver_id <= 0 {
            return Err(AppError::Validation("Invalid receiver id".to_string()));
        }

        self.users
            .resolve_user(receiver_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Receiver not found".to_string()))?;

        let message = self
            .store
            .save_message(sender_id, receiver_id, content)
            .await?;

        let conversation = self
            .store
            .get_or_create_conversation(sender_id, receiver_id)
            .await?;
        self.store
            .touch_conversation(conversation.id, content)
            .await?;

        if let Err(e) = self.broker.publish(&message).await {
            warn!(
                message_id = message.id,
                sender_id, receiver_id, "Live delivery failed, message is stored: {}", e
            );
        }

        debug!(message_id = message.id, sender_id, receiver_id, "Message sent");
        Ok(message)
    }

    /// History between `user_id` and `counterpart_id`, newest first.
    pub async fn get_conversation_messages(
        &self,
        user_id: UserId,
        counterpart_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>> {
        if user_id == counterpart_id {
            return Err(AppError::Validation(
                "Cannot get messages with yourself".to_string(),
            ));
        }

        self.users
            .resolve_user(counterpart_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let page = Pagination::clamp(limit, offset);
        self.store
            .list_messages(user_id, counterpart_id, page.limit, page.offset)
            .await
    }

    pub async fn list_conversations(&self, user_id: UserId) -> Result<Vec<Conversation>> {
        self.store.list_conversations_for_user(user_id).await
    }

    /// Live feed of every message on a pair `user_id` belongs to.
    pub async fn subscribe_user<F>(&self, user_id: UserId, on_message: F) -> Result<Subscription>
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        self.broker.subscribe(user_id, on_message).await
    }
}
