use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    watch,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::ServerFrame;
use crate::message::UserId;

pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Registry-side handle to one live duplex connection.
///
/// Enqueueing never waits: the outbound queue is bounded and, once full, the
/// oldest unsent frame is overwritten.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    user_id: UserId,
    tx: broadcast::Sender<ServerFrame>,
    closed: Arc<watch::Sender<bool>>,
}

impl ConnectionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns false when the writer side is already gone.
    pub fn send(&self, frame: ServerFrame) -> bool {
        self.tx.send(frame).is_ok()
    }

    /// Tells the write loop to close the transport.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

pub enum OutboundEvent {
    Frame(ServerFrame),
    Closed,
}

/// Draining half of a connection's outbound queue, owned by the write loop.
pub struct Outbound {
    user_id: UserId,
    rx: broadcast::Receiver<ServerFrame>,
    closed: watch::Receiver<bool>,
}

impl Outbound {
    /// Next frame in FIFO order, or `Closed` once the connection is closed.
    /// Frames still queued at close time are discarded.
    pub async fn next(&mut self) -> OutboundEvent {
        loop {
            tokio::select! {
                biased;
                _ = self.closed.wait_for(|closed| *closed) => return OutboundEvent::Closed,
                frame = self.rx.recv() => match frame {
                    Ok(frame) => return OutboundEvent::Frame(frame),
                    Err(RecvError::Lagged(dropped)) => {
                        warn!(user_id = self.user_id, dropped, "Outbound queue full, dropped oldest frames");
                    }
                    Err(RecvError::Closed) => return OutboundEvent::Closed,
                },
            }
        }
    }
}

/// Creates a connection for `user_id` with a queue of at least `capacity`
/// frames. `broadcast` rounds the capacity up to a power of two, which is why
/// configuration only accepts powers of two.
pub fn open_connection(user_id: UserId, capacity: usize) -> (ConnectionHandle, Outbound) {
    let (tx, rx) = broadcast::channel(capacity.max(1));
    let (closed_tx, closed_rx) = watch::channel(false);

    let handle = ConnectionHandle {
        id: Uuid::new_v4(),
        user_id,
        tx,
        closed: Arc::new(closed_tx),
    };
    let outbound = Outbound {
        user_id,
        rx,
        closed: closed_rx,
    };

    (handle, outbound)
}

/// At most one live connection per user. Map operations are O(1) and never
/// wrap I/O; closing a connection only flips its close signal.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<UserId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `connection`, closing whatever connection the user had before.
    pub fn register(&self, connection: ConnectionHandle) {
        let user_id = connection.user_id();
        let previous = self.connections.insert(user_id, connection);

        match previous {
            Some(previous) => {
                previous.close();
                info!(user_id, replaced = %previous.id(), "Connection replaced by a newer session");
            }
            None => info!(user_id, "Client connected"),
        }
    }

    /// Removes and closes the user's connection if present.
    pub fn unregister(&self, user_id: UserId) {
        if let Some((_, connection)) = self.connections.remove(&user_id) {
            connection.close();
            info!(user_id, "Client disconnected");
        }
    }

    /// Like `unregister`, but leaves the entry alone if it has since been
    /// replaced by another connection.
    pub fn release(&self, user_id: UserId, connection_id: Uuid) -> bool {
        let removed = self
            .connections
            .remove_if(&user_id, |_, connection| connection.id() == connection_id);

        match removed {
            Some((_, connection)) => {
                connection.close();
                info!(user_id, "Client disconnected");
                true
            }
            None => {
                debug!(user_id, %connection_id, "Connection already replaced or removed");
                false
            }
        }
    }

    pub fn lookup(&self, user_id: UserId) -> Option<ConnectionHandle> {
        self.connections.get(&user_id).map(|entry| entry.value().clone())
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.connections.contains_key(&user_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
