#![allow(dead_code)]
use async_trait::async_trait;
use fanout_notify::broker::{
    Broker, BrokerError, DeliveryStream, ExchangeSpec, InMemoryBroker, QueueSpec,
};
use std::sync::{Arc, Mutex};

/// A broker that records every publish call before forwarding it, and can be
/// told to reject publishes or subscriptions.
#[derive(Clone, Default)]
pub struct SpyBroker {
    pub inner: InMemoryBroker,
    pub published: Arc<Mutex<Vec<(String, String, Vec<u8>)>>>,
    pub reject_publish: Arc<Mutex<Option<BrokerError>>>,
    pub reject_subscribe: Arc<Mutex<Option<BrokerError>>>,
}

impl SpyBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_with(&self, error: BrokerError) {
        *self.reject_publish.lock().unwrap() = Some(error);
    }

    pub fn reject_subscribe_with(&self, error: BrokerError) {
        *self.reject_subscribe.lock().unwrap() = Some(error);
    }

    pub fn publish_calls(&self) -> Vec<(String, String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Broker for SpyBroker {
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> Result<(), BrokerError> {
        self.inner.declare_exchange(spec).await
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), BrokerError> {
        self.inner.declare_queue(spec).await
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        self.inner.bind_queue(queue, exchange, routing_key).await
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Vec<u8>,
    ) -> Result<(), BrokerError> {
        self.published.lock().unwrap().push((
            exchange.to_string(),
            routing_key.to_string(),
            payload.clone(),
        ));
        let rejection = self.reject_publish.lock().unwrap().clone();
        if let Some(error) = rejection {
            return Err(error);
        }
        self.inner.publish(exchange, routing_key, payload).await
    }

    async fn subscribe(&self, queue: &str) -> Result<DeliveryStream, BrokerError> {
        let rejection = self.reject_subscribe.lock().unwrap().clone();
        if let Some(error) = rejection {
            return Err(error);
        }
        self.inner.subscribe(queue).await
    }

    async fn ack(&self, queue: &str, delivery_tag: u64) -> Result<(), BrokerError> {
        self.inner.ack(queue, delivery_tag).await
    }

    async fn nack(
        &self,
        queue: &str,
        delivery_tag: u64,
        requeue: bool,
    ) -> Result<(), BrokerError> {
        self.inner.nack(queue, delivery_tag, requeue).await
    }
}
