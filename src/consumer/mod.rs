//! Per-queue consumers.
//!
//! Every channel gets its own `ChannelConsumer`, reading its own queue in its
//! own task. Consumers share nothing with each other, so a failing or stalled
//! channel only ever affects its own queue.
//!
//! Per message the lifecycle is `Delivered -> Processing -> Acknowledged` or
//! `Delivered -> Processing -> Dropped`. There is no retry: a dropped message
//! is nacked without requeue and reported to the observer.

pub mod registry;

pub use registry::{ConsumerRegistry, RegistryError};

use crate::broker::{Broker, Delivery, DeliveryStream};
use crate::core::{Channel, ChannelSender, Event, SendError};
use crate::observability::SharedObserver;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

#[derive(Error, Debug)]
pub enum ConsumeError {
    #[error("payload is not a valid event: {0}")]
    Deserialization(#[source] serde_json::Error),

    #[error("{channel} delivery failed: {source}")]
    Processing {
        channel: Channel,
        #[source]
        source: SendError,
    },
}

impl ConsumeError {
    /// Short label used in metrics and drop records.
    pub fn reason(&self) -> &'static str {
        match self {
            ConsumeError::Deserialization(_) => "deserialization",
            ConsumeError::Processing { .. } => "processing",
        }
    }
}

/// What happened to a single delivery.
#[derive(Debug)]
pub enum MessageOutcome {
    Acknowledged(Event),
    Dropped(ConsumeError),
}

impl MessageOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, MessageOutcome::Acknowledged(_))
    }
}

/// Consumes one queue and delivers each event through one channel.
pub struct ChannelConsumer {
    queue: String,
    sender: Arc<dyn ChannelSender>,
    observer: SharedObserver,
}

impl ChannelConsumer {
    pub fn new(
        queue: impl Into<String>,
        sender: Arc<dyn ChannelSender>,
        observer: SharedObserver,
    ) -> Self {
        Self {
            queue: queue.into(),
            sender,
            observer,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn channel(&self) -> Channel {
        self.sender.channel()
    }

    /// Decodes and processes one payload. Never fails towards the caller: any
    /// error becomes a `Dropped` outcome, reported to the observer.
    #[instrument(skip_all, fields(channel = self.channel().label(), queue = %self.queue))]
    pub async fn on_message(&self, payload: &[u8]) -> MessageOutcome {
        let channel = self.channel();
        let event: Event = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                let error = ConsumeError::Deserialization(e);
                self.observer
                    .message_dropped(channel, &self.queue, None, &error);
                return MessageOutcome::Dropped(error);
            }
        };

        debug!(event_id = %event.id, "Processing event");
        let sent = AssertUnwindSafe(self.sender.send(&event))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(SendError::Panicked(panic_message(panic.as_ref()))));
        match sent {
            Ok(()) => {
                self.observer.processed(channel, &self.queue, &event);
                MessageOutcome::Acknowledged(event)
            }
            Err(source) => {
                let error = ConsumeError::Processing { channel, source };
                self.observer
                    .message_dropped(channel, &self.queue, Some(&event), &error);
                MessageOutcome::Dropped(error)
            }
        }
    }

    /// Processes one delivery and settles it with the broker.
    async fn handle_delivery(&self, broker: &dyn Broker, delivery: Delivery) {
        let outcome = self.on_message(&delivery.payload).await;
        let settled = if outcome.is_acknowledged() {
            broker.ack(&self.queue, delivery.delivery_tag).await
        } else {
            broker.nack(&self.queue, delivery.delivery_tag, false).await
        };
        if let Err(e) = settled {
            error!(
                queue = %self.queue,
                delivery_tag = delivery.delivery_tag,
                "Failed to settle delivery with broker: {}",
                e
            );
        }
    }

    /// Runs the consumer's main loop over an already opened `stream` until
    /// shutdown or until the queue closes.
    ///
    /// Shutdown is honoured while a message is in flight too: the delivery is
    /// abandoned unsettled, so the broker hands it out again later.
    pub async fn run(
        self: Arc<Self>,
        broker: Arc<dyn Broker>,
        mut stream: DeliveryStream,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let channel = self.channel();
        info!(channel = channel.label(), queue = %self.queue, "Consumer started");

        loop {
            let delivery = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!(channel = channel.label(), "Consumer received shutdown signal.");
                    break;
                }
                delivery = stream.recv() => delivery,
            };

            let Some(delivery) = delivery else {
                info!(channel = channel.label(), "Queue closed. Consumer shutting down.");
                break;
            };

            let delivery_tag = delivery.delivery_tag;
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    warn!(
                        channel = channel.label(),
                        delivery_tag,
                        "Consumer received shutdown signal during processing, leaving delivery unacked."
                    );
                    break;
                }
                _ = self.handle_delivery(broker.as_ref(), delivery) => {}
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
