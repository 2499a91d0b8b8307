//! The observability handle passed to the producer and each consumer.
//!
//! Components never log publish or drop outcomes through ambient state alone;
//! they report them to an `Observer` they were constructed with. The default
//! `TracingObserver` turns reports into `tracing` events and `metrics`
//! counters, while tests inject a `RecordingObserver` and assert on what it
//! captured.

use crate::consumer::ConsumeError;
use crate::core::{Channel, Event};
use crate::producer::PublishError;
use metrics::Unit;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Receives the outcome of every publish and every consumed message.
pub trait Observer: Send + Sync {
    fn published(&self, event: &Event, exchange: &str);

    fn publish_failed(&self, event: &Event, exchange: &str, error: &PublishError);

    fn processed(&self, channel: Channel, queue: &str, event: &Event);

    /// A message was discarded. `event` is `None` when the payload could not
    /// be decoded.
    fn message_dropped(
        &self,
        channel: Channel,
        queue: &str,
        event: Option<&Event>,
        error: &ConsumeError,
    );
}

/// Registers metric descriptions with the installed recorder.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "events_published_total",
        Unit::Count,
        "Total number of events handed to the exchange."
    );
    metrics::describe_counter!(
        "events_publish_failed_total",
        Unit::Count,
        "Total number of publish attempts rejected by the broker or serializer."
    );
    metrics::describe_counter!(
        "messages_processed_total",
        Unit::Count,
        "Total number of messages delivered through a channel, labeled by channel."
    );
    metrics::describe_counter!(
        "messages_dropped_total",
        Unit::Count,
        "Total number of messages discarded after a consumer failure, labeled by channel and reason."
    );
}

/// Default observer: structured logs plus counters.
#[derive(Debug, Clone, Default)]
pub struct TracingObserver;

impl TracingObserver {
    pub fn new() -> Self {
        Self
    }
}

impl Observer for TracingObserver {
    fn published(&self, event: &Event, exchange: &str) {
        info!(event_id = %event.id, kind = %event.kind, exchange, "Event published");
        metrics::counter!("events_published_total").increment(1);
    }

    fn publish_failed(&self, event: &Event, exchange: &str, error: &PublishError) {
        error!(event_id = %event.id, exchange, error = %error, "Failed to publish event");
        metrics::counter!("events_publish_failed_total").increment(1);
    }

    fn processed(&self, channel: Channel, queue: &str, event: &Event) {
        info!(
            channel = channel.label(),
            queue,
            event_id = %event.id,
            recipient = %event.recipient,
            "Notification delivered"
        );
        metrics::counter!("messages_processed_total", "channel" => channel.label()).increment(1);
    }

    fn message_dropped(
        &self,
        channel: Channel,
        queue: &str,
        event: Option<&Event>,
        error: &ConsumeError,
    ) {
        let event_id = event.map(|e| e.id.as_str()).unwrap_or("<undecodable>");
        warn!(
            channel = channel.label(),
            queue,
            event_id,
            reason = error.reason(),
            error = %error,
            "Message dropped without retry"
        );
        metrics::counter!(
            "messages_dropped_total",
            "channel" => channel.label(),
            "reason" => error.reason()
        )
        .increment(1);
    }
}

/// One captured report.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Published {
        event_id: String,
        exchange: String,
    },
    PublishFailed {
        event_id: String,
        error: String,
    },
    Processed {
        channel: Channel,
        queue: String,
        event: Event,
    },
    Dropped {
        channel: Channel,
        queue: String,
        event_id: Option<String>,
        reason: &'static str,
    },
}

/// Observer that keeps every report in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    observations: Arc<Mutex<Vec<Observation>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, observation: Observation) {
        self.observations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(observation);
    }

    pub fn observations(&self) -> Vec<Observation> {
        self.observations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Events processed by `channel`, in completion order.
    pub fn processed_by(&self, channel: Channel) -> Vec<Event> {
        self.observations()
            .into_iter()
            .filter_map(|o| match o {
                Observation::Processed {
                    channel: c, event, ..
                } if c == channel => Some(event),
                _ => None,
            })
            .collect()
    }

    pub fn dropped_by(&self, channel: Channel) -> Vec<Observation> {
        self.observations()
            .into_iter()
            .filter(|o| matches!(o, Observation::Dropped { channel: c, .. } if *c == channel))
            .collect()
    }
}

impl Observer for RecordingObserver {
    fn published(&self, event: &Event, exchange: &str) {
        self.push(Observation::Published {
            event_id: event.id.clone(),
            exchange: exchange.to_string(),
        });
    }

    fn publish_failed(&self, event: &Event, _exchange: &str, error: &PublishError) {
        self.push(Observation::PublishFailed {
            event_id: event.id.clone(),
            error: error.to_string(),
        });
    }

    fn processed(&self, channel: Channel, queue: &str, event: &Event) {
        self.push(Observation::Processed {
            channel,
            queue: queue.to_string(),
            event: event.clone(),
        });
    }

    fn message_dropped(
        &self,
        channel: Channel,
        queue: &str,
        event: Option<&Event>,
        error: &ConsumeError,
    ) {
        self.push(Observation::Dropped {
            channel,
            queue: queue.to_string(),
            event_id: event.map(|e| e.id.clone()),
            reason: error.reason(),
        });
    }
}

/// Shared handle type used throughout the crate.
pub type SharedObserver = Arc<dyn Observer>;
