#![allow(dead_code)]
use async_trait::async_trait;
use fanout_notify::core::{Channel, ChannelSender, Event, SendError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// A sender that records every event it is asked to deliver.
#[derive(Clone)]
pub struct RecordingSender {
    channel: Channel,
    pub sent: Arc<Mutex<Vec<Event>>>,
    notifier: Arc<Notify>,
}

impl RecordingSender {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            sent: Arc::new(Mutex::new(Vec::new())),
            notifier: Arc::new(Notify::new()),
        }
    }

    pub fn sent(&self) -> Vec<Event> {
        self.sent.lock().unwrap().clone()
    }

    pub async fn wait_for_count(&self, target: usize, timeout: Duration) {
        let wait = async {
            loop {
                let notified = self.notifier.notified();
                if self.sent.lock().unwrap().len() >= target {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .expect("Timed out waiting for deliveries");
    }
}

#[async_trait]
impl ChannelSender for RecordingSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, event: &Event) -> Result<(), SendError> {
        self.sent.lock().unwrap().push(event.clone());
        self.notifier.notify_waiters();
        Ok(())
    }
}

/// A sender whose transport always fails.
#[derive(Clone)]
pub struct FailingSender {
    channel: Channel,
}

impl FailingSender {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ChannelSender for FailingSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, _event: &Event) -> Result<(), SendError> {
        Err(SendError::Unavailable("transport is down".to_string()))
    }
}

/// A sender that never returns, stalling its consumer.
#[derive(Clone)]
pub struct HangingSender {
    channel: Channel,
}

impl HangingSender {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ChannelSender for HangingSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, _event: &Event) -> Result<(), SendError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// A sender that panics on its first `panics` sends, then succeeds.
#[derive(Clone)]
pub struct PanickingSender {
    channel: Channel,
    panics: usize,
    calls: Arc<AtomicUsize>,
}

impl PanickingSender {
    pub fn new(channel: Channel, panics: usize) -> Self {
        Self {
            channel,
            panics,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelSender for PanickingSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, _event: &Event) -> Result<(), SendError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.panics {
            panic!("transport client bug");
        }
        Ok(())
    }
}
