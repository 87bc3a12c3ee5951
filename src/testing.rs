//! In-memory collaborators for unit tests: a message store, a user directory and
//! a subject-matching bus that mimics core NATS wildcards.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    broker::{BrokerBridge, BusMessage, BusStream, MessageBus},
    error::{AppError, Result},
    message::{
        message_repository::validate_new_message, ordered_pair, Conversation, Message,
        MessageService, MessageStore, Pagination, UserId,
    },
    state::Config,
    user::{UserDirectory, UserSummary},
};

pub fn message(id: i64, sender_id: UserId, receiver_id: UserId, content: &str) -> Message {
    Message {
        id,
        sender_id,
        receiver_id,
        content: content.to_string(),
        created_at: Utc::now(),
    }
}

pub fn config() -> Config {
    Config {
        database_url: "postgres://localhost/test".to_string(),
        database_max_connections: 1,
        jwt_secret: "test-secret".to_string(),
        nats_url: "nats://localhost:4222".to_string(),
        nats_connect_retries: 1,
        nats_retry_delay: Duration::from_millis(10),
        host: "127.0.0.1".to_string(),
        port: 0,
        outbound_queue_capacity: 16,
        ws_heartbeat_interval: Duration::from_secs(60),
    }
}

/// Polls `condition` until it holds or a second passes.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[derive(Default)]
struct StoreState {
    messages: Vec<Message>,
    conversations: Vec<Conversation>,
    next_message_id: i64,
    next_conversation_id: i64,
}

/// Message store and user directory over one in-memory state.
#[derive(Default)]
pub struct InMemoryStore {
    users: HashMap<UserId, String>,
    state: Mutex<StoreState>,
    fail_saves: AtomicBool,
    fail_conversation_updates: AtomicBool,
}

impl InMemoryStore {
    pub fn with_users(ids: &[UserId]) -> Self {
        Self {
            users: ids.iter().map(|id| (*id, format!("user-{id}"))).collect(),
            ..Default::default()
        }
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_conversation_updates(&self, fail: bool) {
        self.fail_conversation_updates.store(fail, Ordering::SeqCst);
    }

    pub fn message_count(&self) -> usize {
        self.state.lock().unwrap().messages.len()
    }

    pub fn conversation_count(&self) -> usize {
        self.state.lock().unwrap().conversations.len()
    }

    fn storage_failure() -> AppError {
        AppError::Storage(sqlx::Error::PoolTimedOut)
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn resolve_user(&self, user_id: UserId) -> Result<Option<UserSummary>> {
        Ok(self.users.get(&user_id).map(|name| UserSummary {
            id: user_id,
            name: name.clone(),
        }))
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn save_message(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        content: &str,
    ) -> Result<Message> {
        validate_new_message(sender_id, receiver_id, content)?;
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Self::storage_failure());
        }
        if !self.users.contains_key(&sender_id) {
            return Err(AppError::NotFound("Sender not found".to_string()));
        }
        if !self.users.contains_key(&receiver_id) {
            return Err(AppError::NotFound("Receiver not found".to_string()));
        }

        let mut state = self.state.lock().unwrap();
        state.next_message_id += 1;
        let message = Message {
            id: state.next_message_id,
            sender_id,
            receiver_id,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        state.messages.push(message.clone());
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
        let pair = ordered_pair(a, b);

        let state = self.state.lock().unwrap();
        let mut messages: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| ordered_pair(m.sender_id, m.receiver_id) == pair)
            .cloned()
            .collect();
        messages.sort_by(|x, y| y.created_at.cmp(&x.created_at).then(y.id.cmp(&x.id)));

        Ok(messages
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn get_or_create_conversation(&self, a: UserId, b: UserId) -> Result<Conversation> {
        if a == b {
            return Err(AppError::Validation(
                "A conversation needs two different users".to_string(),
            ));
        }
        if self.fail_conversation_updates.load(Ordering::SeqCst) {
            return Err(Self::storage_failure());
        }
        let (user1_id, user2_id) = ordered_pair(a, b);

        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state
            .conversations
            .iter()
            .find(|c| c.user1_id == user1_id && c.user2_id == user2_id)
        {
            return Ok(existing.clone());
        }

        state.next_conversation_id += 1;
        let conversation = Conversation {
            id: state.next_conversation_id,
            user1_id,
            user2_id,
            last_message: String::new(),
            updated_at: Utc::now(),
        };
        state.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn touch_conversation(&self, conversation_id: i64, last_message: &str) -> Result<()> {
        if self.fail_conversation_updates.load(Ordering::SeqCst) {
            return Err(Self::storage_failure());
        }

        let mut state = self.state.lock().unwrap();
        let conversation = state
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))?;
        conversation.last_message = last_message.to_string();
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn list_conversations_for_user(&self, user_id: UserId) -> Result<Vec<Conversation>> {
        let state = self.state.lock().unwrap();
        let mut conversations: Vec<Conversation> = state
            .conversations
            .iter()
            .filter(|c| c.user1_id == user_id || c.user2_id == user_id)
            .cloned()
            .collect();
        conversations.sort_by(|x, y| y.updated_at.cmp(&x.updated_at).then(y.id.cmp(&x.id)));
        Ok(conversations)
    }
}

/// `*` matches one token, `>` matches the remaining tokens.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut subject_tokens = subject.split('.');
    for token in pattern.split('.') {
        match (token, subject_tokens.next()) {
            (">", Some(_)) => return true,
            ("*", Some(_)) => {}
            (expected, Some(actual)) if expected == actual => {}
            _ => return false,
        }
    }
    subject_tokens.next().is_none()
}

/// Process-local bus with NATS subject semantics.
#[derive(Default)]
pub struct LocalBus {
    subscribers: Mutex<Vec<(String, mpsc::UnboundedSender<BusMessage>)>>,
    fail_publishes: AtomicBool,
    close_calls: AtomicUsize,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Subscriptions whose consumer is still alive.
    pub fn active_subscriptions(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .count()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn publish(&self, subject: String, payload: Vec<u8>) -> Result<()> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(AppError::Broker("publish failed: connection refused".to_string()));
        }

        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|(_, tx)| !tx.is_closed());
        for (pattern, tx) in subscribers.iter() {
            if subject_matches(pattern, &subject) {
                let _ = tx.send(BusMessage {
                    subject: subject.clone(),
                    payload: payload.clone(),
                });
            }
        }
        Ok(())
    }

    async fn subscribe(&self, pattern: String) -> Result<BusStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push((pattern, tx));
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().unwrap().clear();
        Ok(())
    }
}

/// A pipeline wired to in-memory collaborators.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub bus: Arc<LocalBus>,
    pub broker: Arc<BrokerBridge>,
    pub service: MessageService,
}

impl Harness {
    pub fn with_users(ids: &[UserId]) -> Self {
        let store = Arc::new(InMemoryStore::with_users(ids));
        let bus = Arc::new(LocalBus::new());
        let broker = Arc::new(BrokerBridge::new(bus.clone()));
        let service = MessageService::new(store.clone(), store.clone(), broker.clone());
        Self {
            store,
            bus,
            broker,
            service,
        }
    }
}

mod tests {
    use super::*;

    #[test]
    fn test_subject_matching() {
        assert!(subject_matches("chat.private.1.*", "chat.private.1.2"));
        assert!(subject_matches("chat.private.*.2", "chat.private.1.2"));
        assert!(subject_matches("chat.>", "chat.private.1.2"));
        assert!(!subject_matches("chat.private.1.*", "chat.private.11.2"));
        assert!(!subject_matches("chat.private.*.2", "chat.private.1.22"));
        assert!(!subject_matches("chat.private.*", "chat.private.1.2"));
    }
}
