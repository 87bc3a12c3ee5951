//! Live fan-out of persisted messages over a publish/subscribe broker.
//!
//! Every conversation pair maps to one subject, `chat.private.{low}.{high}`.
//! A connected user listens on both wildcard positions so it sees every pair
//! it belongs to and nothing else:
//!
//! ```text
//!  sender ── publish ──► chat.private.3.7 ──► subscriber "chat.private.3.*" (user 3)
//!                                        └──► subscriber "chat.private.*.7" (user 7)
//! ```

pub mod broker_bridge;
pub mod nats_bus;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;

pub use broker_bridge::{topic_for, BrokerBridge, Subscription, PRIVATE_SUBJECT_PREFIX};
pub use nats_bus::NatsBus;

/// One payload delivered on a subject.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub subject: String,
    pub payload: Vec<u8>,
}

pub type BusStream = BoxStream<'static, BusMessage>;

/// Raw transport underneath the bridge. Dropping a stream returned by
/// `subscribe` must release the broker-side subscription.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, subject: String, payload: Vec<u8>) -> Result<()>;

    async fn subscribe(&self, pattern: String) -> Result<BusStream>;

    async fn close(&self) -> Result<()>;
}
