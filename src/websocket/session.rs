//! One authenticated duplex connection.
//!
//! ```text
//!  Connecting ──register + subscribe──► Open ──read end / write end / replaced──► Closing ──► Closed
//! ```
//!
//! While open, three contexts run independently:
//! - the **read loop** turns inbound `{to, content}` frames into sends,
//! - the **write loop** drains the outbound queue onto the transport,
//! - the broker's dispatch task enqueues live messages without waiting.

use std::{fmt::Display, time::Duration};

use axum::extract::ws::Message as WsMessage;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use super::{
    connection::{open_connection, ConnectionHandle, ConnectionRegistry, Outbound, OutboundEvent},
    types::{InboundFrame, ServerFrame},
    DEFAULT_OUTBOUND_CAPACITY,
};
use crate::message::{MessageService, UserId};

/// How long the writer gets to send a close frame once the reader is done.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub outbound_capacity: usize,
    pub heartbeat_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

pub struct DuplexSession {
    user_id: UserId,
    service: MessageService,
    registry: ConnectionRegistry,
    config: SessionConfig,
    state: SessionState,
}

impl DuplexSession {
    pub fn new(
        user_id: UserId,
        service: MessageService,
        registry: ConnectionRegistry,
        config: SessionConfig,
    ) -> Self {
        Self {
            user_id,
            service,
            registry,
            config,
            state: SessionState::Connecting,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug!(user_id = self.user_id, from = ?self.state, to = ?next, "Session state change");
        self.state = next;
    }

    /// Drives the session over an already upgraded transport until it closes.
    /// Returns the terminal state.
    pub async fn run<S, R, E>(mut self, sink: S, stream: R) -> SessionState
    where
        S: Sink<WsMessage> + Unpin + Send + 'static,
        S::Error: Display + Send,
        R: Stream<Item = Result<WsMessage, E>> + Unpin + Send + 'static,
        E: Display + Send + 'static,
    {
        let user_id = self.user_id;
        let (connection, outbound) = open_connection(user_id, self.config.outbound_capacity);
        let connection_id = connection.id();
        self.registry.register(connection.clone());

        let live = connection.clone();
        let subscription = match self
            .service
            .subscribe_user(user_id, move |message| {
                if !live.send(ServerFrame::Message(message)) {
                    debug!(user_id, "Writer gone, dropping live message");
                }
            })
            .await
        {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                warn!(user_id, "Live delivery unavailable for this session: {}", e);
                None
            }
        };

        self.transition(SessionState::Open);
        info!(user_id, %connection_id, "Duplex session open");

        let mut write_task = tokio::spawn(write_loop(
            user_id,
            sink,
            outbound,
            self.config.heartbeat_interval,
        ));
        let mut read_task = tokio::spawn(read_loop(
            user_id,
            stream,
            self.service.clone(),
            connection.clone(),
        ));

        tokio::select! {
            _ = &mut write_task => read_task.abort(),
            _ = &mut read_task => {
                connection.close();
                if tokio::time::timeout(CLOSE_GRACE, &mut write_task).await.is_err() {
                    write_task.abort();
                }
            }
        }

        self.transition(SessionState::Closing);
        self.registry.release(user_id, connection_id);
        connection.close();
        if let Some(subscription) = subscription {
            subscription.cancel().await;
        }

        self.transition(SessionState::Closed);
        info!(user_id, %connection_id, "Duplex session closed");
        self.state
    }
}

async fn write_loop<S>(user_id: UserId, mut sink: S, mut outbound: Outbound, heartbeat: Duration)
where
    S: Sink<WsMessage> + Unpin,
    S::Error: Display,
{
    // A zero period would panic in `interval_at`.
    let heartbeat = heartbeat.max(Duration::from_secs(1));
    let mut heartbeat = interval_at(Instant::now() + heartbeat, heartbeat);

    loop {
        tokio::select! {
            event = outbound.next() => match event {
                OutboundEvent::Frame(frame) => {
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(user_id, "Could not encode outbound frame: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(WsMessage::Text(text)).await {
                        debug!(user_id, "Write failed, closing session: {}", e);
                        break;
                    }
                }
                OutboundEvent::Closed => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
            },
            _ = heartbeat.tick() => {
                if sink.send(WsMessage::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn read_loop<R, E>(
    user_id: UserId,
    mut stream: R,
    service: MessageService,
    connection: ConnectionHandle,
) where
    R: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: Display,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => handle_text(user_id, &text, &service, &connection).await,
            Ok(WsMessage::Close(_)) => break,
            // Binary frames carry nothing here; ping/pong is answered by the transport.
            Ok(_) => {}
            Err(e) => {
                debug!(user_id, "Read failed, closing session: {}", e);
                break;
            }
        }
    }
}

async fn handle_text(
    user_id: UserId,
    text: &str,
    service: &MessageService,
    connection: &ConnectionHandle,
) {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(user_id, "Skipping undecodable frame: {}", e);
            return;
        }
    };

    // Spawned so that a session teardown never cancels a send halfway.
    let service = service.clone();
    let outcome = tokio::spawn(async move {
        service
            .send_message(user_id, frame.to, &frame.content)
            .await
    })
    .await;

    match outcome {
        Ok(Ok(message)) => debug!(user_id, message_id = message.id, "Frame delivered to pipeline"),
        Ok(Err(e)) => {
            debug!(user_id, "Send from session failed: {}", e);
            connection.send(ServerFrame::error(e.user_message()));
        }
        Err(e) => warn!(user_id, "Send task failed: {}", e),
    }
}
