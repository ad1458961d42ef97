//! Abstraction over an AMQP-style message broker: named queues, fanout
//! exchanges, and a correlated request/reply pattern built on top. Payload
//! encoding is entirely the caller's concern — the adapter only ever
//! moves opaque bytes.
//!
//! Two implementations exist: [`memory::MemoryBroker`], an in-process
//! broker used by tests and the `--transport memory` demo mode, and
//! [`amqp::AmqpBroker`], backed by `lapin` for a real deployment. Protocol
//! logic (`crate::cluster`) depends only on the [`BrokerAdapter`] trait
//! object, never on a concrete transport.

pub mod amqp;
pub mod memory;
pub mod names;

use async_trait::async_trait;

use crate::error::ParkClusterError;

/// One message received off a queue: its body plus whatever request/reply
/// carrier metadata it arrived with.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub body: Vec<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
}

impl Delivery {
    pub fn text(&self) -> Result<&str, ParkClusterError> {
        std::str::from_utf8(&self.body)
            .map_err(|e| ParkClusterError::protocol(format!("non-utf8 payload: {}", e)))
    }
}

/// A live subscription on a queue. Each call to [`Consumer::recv`]
/// suspends until the next delivery, or returns `Ok(None)` once the
/// underlying channel is permanently closed (e.g. broker shutdown).
#[async_trait]
pub trait Consumer: Send {
    async fn recv(&mut self) -> Result<Option<Delivery>, ParkClusterError>;
}

/// Options carried alongside a published message.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
}

impl PublishOptions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_correlation(correlation_id: impl Into<String>, reply_to: impl Into<String>) -> Self {
        PublishOptions {
            correlation_id: Some(correlation_id.into()),
            reply_to: Some(reply_to.into()),
        }
    }
}

/// Transport abstraction required by every cluster component. Declarations
/// are idempotent and safe to repeat after a reconnect.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// Declares a named, non-durable queue. Idempotent.
    async fn declare_queue(&self, name: &str) -> Result<(), ParkClusterError>;

    /// Declares an auto-deletable, exclusive queue with a broker-chosen
    /// unique name, returning the name that was assigned. Used for reply
    /// queues and per-node fanout bindings.
    async fn declare_exclusive_queue(
        &self,
        name_hint: &str,
    ) -> Result<String, ParkClusterError>;

    /// Declares a fanout exchange. Idempotent.
    async fn declare_fanout(&self, exchange: &str) -> Result<(), ParkClusterError>;

    /// Binds `queue` so it receives every message published to `exchange`.
    async fn bind_fanout(
        &self,
        exchange: &str,
        queue: &str,
    ) -> Result<(), ParkClusterError>;

    /// Publishes to a named queue.
    async fn publish(
        &self,
        queue: &str,
        body: &[u8],
        opts: PublishOptions,
    ) -> Result<(), ParkClusterError>;

    /// Publishes to a fanout exchange; the publisher gets no feedback.
    async fn publish_fanout(
        &self,
        exchange: &str,
        body: &[u8],
    ) -> Result<(), ParkClusterError>;

    /// Begins consuming from a named queue.
    async fn consume(
        &self,
        queue: &str,
    ) -> Result<Box<dyn Consumer>, ParkClusterError>;
}
