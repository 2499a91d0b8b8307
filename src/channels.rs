//! Channel-specific senders.
//!
//! These are the placeholder transports behind each consumer. They log the
//! notification and hold the consumer's processing slot for a configurable
//! latency, standing in for a call to an SMTP relay, SMS gateway or push
//! service. A real transport implements `ChannelSender` the same way.

use crate::config::ChannelConfig;
use crate::core::{Channel, ChannelSender, Event, SendError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

async fn simulate_send(channel: Channel, latency: Duration, event: &Event) {
    debug!(
        channel = channel.label(),
        event_id = %event.id,
        title = %event.title,
        body = %event.body,
        "Sending notification"
    );
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
    info!(channel = channel.label(), recipient = %event.recipient, "Notification sent");
}

pub struct EmailSender {
    latency: Duration,
}

impl EmailSender {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, event: &Event) -> Result<(), SendError> {
        simulate_send(Channel::Email, self.latency, event).await;
        Ok(())
    }
}

pub struct SmsSender {
    latency: Duration,
}

impl SmsSender {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl ChannelSender for SmsSender {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(&self, event: &Event) -> Result<(), SendError> {
        simulate_send(Channel::Sms, self.latency, event).await;
        Ok(())
    }
}

pub struct PushSender {
    latency: Duration,
}

impl PushSender {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl ChannelSender for PushSender {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    async fn send(&self, event: &Event) -> Result<(), SendError> {
        simulate_send(Channel::Push, self.latency, event).await;
        Ok(())
    }
}

/// Builds the default sender for a channel from its configuration.
pub fn sender_for(channel: Channel, config: &ChannelConfig) -> Arc<dyn ChannelSender> {
    let latency = Duration::from_millis(config.simulated_latency_ms);
    match channel {
        Channel::Email => Arc::new(EmailSender::new(latency)),
        Channel::Sms => Arc::new(SmsSender::new(latency)),
        Channel::Push => Arc::new(PushSender::new(latency)),
    }
}
