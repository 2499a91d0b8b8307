//! Publishes events to the fanout exchange.
//!
//! The producer knows the exchange name and nothing else: which queues are
//! bound, and how many, is decided entirely by the topology.

use crate::broker::{Broker, BrokerError};
use crate::core::Event;
use crate::observability::SharedObserver;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

/// Fanout exchanges ignore the routing key; an empty one is sent.
const FANOUT_ROUTING_KEY: &str = "";

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("failed to serialize event: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("broker rejected the publish: {0}")]
    Broker(#[source] BrokerError),
}

/// Cloneable publishing handle shared by every caller.
#[derive(Clone)]
pub struct EventProducer {
    broker: Arc<dyn Broker>,
    exchange: String,
    observer: SharedObserver,
}

impl EventProducer {
    pub fn new(broker: Arc<dyn Broker>, exchange: impl Into<String>, observer: SharedObserver) -> Self {
        Self {
            broker,
            exchange: exchange.into(),
            observer,
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Publishes `event` to the exchange.
    ///
    /// An id is generated and written back into `event` before anything is
    /// sent, so the caller can correlate on it even if the publish fails.
    #[instrument(skip_all, fields(exchange = %self.exchange))]
    pub async fn publish(&self, event: &mut Event) -> Result<(), PublishError> {
        if event.ensure_id() {
            debug!(event_id = %event.id, "Assigned event id");
        }

        match self.send(event).await {
            Ok(()) => {
                self.observer.published(event, &self.exchange);
                Ok(())
            }
            Err(e) => {
                self.observer.publish_failed(event, &self.exchange, &e);
                Err(e)
            }
        }
    }

    async fn send(&self, event: &Event) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event).map_err(PublishError::Serialization)?;
        self.broker
            .publish(&self.exchange, FANOUT_ROUTING_KEY, payload)
            .await
            .map_err(PublishError::Broker)
    }

    /// Builds an event with a fresh id from the given fields and publishes it.
    /// The event is returned so the caller can report its id.
    pub async fn publish_notification(
        &self,
        kind: &str,
        title: &str,
        body: &str,
        recipient: &str,
    ) -> Result<Event, PublishError> {
        let mut event = Event::with_generated_id(kind, title, body, recipient);
        self.publish(&mut event).await?;
        Ok(event)
    }
}
