use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use futures::StreamExt;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, warn};

use super::{BusStream, MessageBus};
use crate::{
    error::{AppError, Result},
    message::{ordered_pair, Message, UserId},
};

pub const PRIVATE_SUBJECT_PREFIX: &str = "chat.private";

/// Subject shared by both participants of a pair, whichever side asks.
pub fn topic_for(a: UserId, b: UserId) -> String {
    let (low, high) = ordered_pair(a, b);
    format!("{PRIVATE_SUBJECT_PREFIX}.{low}.{high}")
}

/// Wildcards covering every pair `user_id` belongs to, in both sorted positions.
fn subscription_patterns(user_id: UserId) -> [String; 2] {
    [
        format!("{PRIVATE_SUBJECT_PREFIX}.{user_id}.*"),
        format!("{PRIVATE_SUBJECT_PREFIX}.*.{user_id}"),
    ]
}

type MessageCallback = Arc<dyn Fn(Message) + Send + Sync>;

/// Publishes persisted messages to their pair topic and dispatches deliveries
/// to per-user callbacks. Constructed once and shared by reference.
pub struct BrokerBridge {
    bus: Arc<dyn MessageBus>,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
}

impl BrokerBridge {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            bus,
            shutdown,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub async fn publish(&self, message: &Message) -> Result<()> {
        if self.is_closed() {
            return Err(AppError::Broker("broker connection is closed".to_string()));
        }

        let payload = serde_json::to_vec(message)
            .map_err(|e| AppError::Broker(format!("could not encode message: {}", e)))?;
        let subject = topic_for(message.sender_id, message.receiver_id);

        debug!(message_id = message.id, %subject, "Publishing message");
        self.bus.publish(subject, payload).await
    }

    /// Invokes `on_message` once per message delivered on any pair `user_id`
    /// belongs to. The callback runs on the bridge's dispatch task and must not
    /// block.
    pub async fn subscribe<F>(&self, user_id: UserId, on_message: F) -> Result<Subscription>
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        if self.is_closed() {
            return Err(AppError::Broker("broker connection is closed".to_string()));
        }

        let callback: MessageCallback = Arc::new(on_message);
        let mut streams = Vec::with_capacity(2);
        for pattern in subscription_patterns(user_id) {
            // A failure here drops the streams opened so far, releasing them.
            streams.push(self.bus.subscribe(pattern).await?);
        }

        let tasks = streams
            .into_iter()
            .map(|stream| {
                tokio::spawn(dispatch(
                    user_id,
                    stream,
                    callback.clone(),
                    self.shutdown.subscribe(),
                ))
            })
            .collect();

        debug!(user_id, "Subscribed to private messages");
        Ok(Subscription { user_id, tasks })
    }

    /// Ends every live subscription and flushes the connection. Safe to call
    /// more than once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.shutdown.send_replace(true);
        if let Err(e) = self.bus.close().await {
            warn!("Error closing broker connection: {}", e);
        }
    }
}

async fn dispatch(
    user_id: UserId,
    mut stream: BusStream,
    callback: MessageCallback,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.wait_for(|closed| *closed) => break,
            delivery = stream.next() => {
                let Some(delivery) = delivery else { break };

                match serde_json::from_slice::<Message>(&delivery.payload) {
                    Ok(message) if message.involves(user_id) => callback(message),
                    Ok(message) => {
                        warn!(user_id, subject = %delivery.subject, message_id = message.id,
                            "Dropping message for a pair the subscriber is not part of");
                    }
                    Err(e) => {
                        warn!(user_id, subject = %delivery.subject, "Dropping malformed payload: {}", e);
                    }
                }
            }
        }
    }
}

/// Live interest in one user's pairs. Cancelling (or dropping) it releases the
/// broker-side subscriptions.
pub struct Subscription {
    user_id: UserId,
    tasks: Vec<JoinHandle<()>>,
}

impl Subscription {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub async fn cancel(mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
            let _ = task.await;
        }
        debug!(user_id = self.user_id, "Subscription cancelled");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
