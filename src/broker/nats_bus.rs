use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{info, warn};

use super::{BusMessage, BusStream, MessageBus};
use crate::error::{AppError, Result};

/// `MessageBus` backed by a core NATS connection.
#[derive(Clone)]
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    /// Connects to `url`, retrying up to `attempts` times with `retry_delay`
    /// between failures.
    pub async fn connect(url: &str, attempts: u32, retry_delay: Duration) -> Result<Self> {
        let attempts = attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match async_nats::connect(url).await {
                Ok(client) => {
                    info!("Connected to NATS at {}", url);
                    return Ok(Self { client });
                }
                Err(e) if attempt < attempts => {
                    warn!("Failed to connect to NATS (attempt {}/{}): {}", attempt, attempts, e);
                    tokio::time::sleep(retry_delay).await;
                }
                Err(e) => {
                    return Err(AppError::Broker(format!(
                        "could not connect to NATS after {} attempts: {}",
                        attempts, e
                    )));
                }
            }
        }
    }

    pub fn from_client(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, subject: String, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(subject, payload.into())
            .await
            .map_err(|e| AppError::Broker(format!("publish failed: {}", e)))
    }

    async fn subscribe(&self, pattern: String) -> Result<BusStream> {
        let subscriber = self
            .client
            .subscribe(pattern)
            .await
            .map_err(|e| AppError::Broker(format!("subscribe failed: {}", e)))?;

        // The subscriber sends UNSUB when dropped together with the stream.
        let stream = subscriber.map(|msg| BusMessage {
            subject: msg.subject.to_string(),
            payload: msg.payload.to_vec(),
        });

        Ok(stream.boxed())
    }

    /// Drains the connection: pending publishes are flushed, every subscription
    /// is unsubscribed (its stream ends) and the client shuts down.
    async fn close(&self) -> Result<()> {
        self.client
            .drain()
            .await
            .map_err(|e| AppError::Broker(format!("drain failed: {}", e)))
    }
}
