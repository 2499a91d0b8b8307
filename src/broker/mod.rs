//! The contract the fanout core requires from its messaging substrate.
//!
//! The producer, the consumers and the topology declaration only talk to a
//! `Broker`. `memory::InMemoryBroker` is the process-local implementation used
//! by the binary and the tests; a networked client would implement the same
//! trait.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::InMemoryBroker;

/// A fanout exchange: every bound queue receives a copy of every message and
/// routing keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeSpec {
    pub name: String,
    pub durable: bool,
}

impl ExchangeSpec {
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
}

impl QueueSpec {
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
        }
    }
}

/// A message handed to a queue subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub queue: String,
    /// Broker-assigned tag used to ack or nack this delivery.
    pub delivery_tag: u64,
    pub payload: Vec<u8>,
    /// Set when the message was handed out before and never acknowledged.
    pub redelivered: bool,
}

/// The stream of deliveries for one queue subscription.
#[derive(Debug)]
pub struct DeliveryStream {
    queue: String,
    rx: async_channel::Receiver<Delivery>,
}

impl DeliveryStream {
    pub fn new(queue: impl Into<String>, rx: async_channel::Receiver<Delivery>) -> Self {
        Self {
            queue: queue.into(),
            rx,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Waits for the next delivery. Returns `None` once the queue is closed.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await.ok()
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrokerError {
    #[error("broker unreachable: {0}")]
    Unreachable(String),

    #[error("no exchange named '{0}'")]
    UnknownExchange(String),

    #[error("no queue named '{0}'")]
    UnknownQueue(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("queue '{0}' is closed")]
    Closed(String),
}

/// Messaging substrate primitives.
///
/// Declarations are idempotent: declaring a resource that already exists with
/// an identical definition succeeds and creates nothing new. Implementations
/// must accept concurrent `publish` calls from many tasks.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> Result<(), BrokerError>;

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), BrokerError>;

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError>;

    /// Hands a serialized message to an exchange for routing.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Vec<u8>,
    ) -> Result<(), BrokerError>;

    /// Opens a delivery stream on a queue.
    async fn subscribe(&self, queue: &str) -> Result<DeliveryStream, BrokerError>;

    /// Confirms a delivery was processed; the broker forgets it. Settling a
    /// tag that was superseded by a redelivery is a no-op.
    async fn ack(&self, queue: &str, delivery_tag: u64) -> Result<(), BrokerError>;

    /// Rejects a delivery. With `requeue` it is delivered again, otherwise it
    /// is discarded.
    async fn nack(&self, queue: &str, delivery_tag: u64, requeue: bool)
        -> Result<(), BrokerError>;
}
