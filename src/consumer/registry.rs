//! Explicit queue → handler wiring, built once at startup.

use super::ChannelConsumer;
use crate::broker::{Broker, BrokerError};
use crate::task_manager::TaskManager;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("queue '{0}' already has a registered consumer")]
    DuplicateQueue(String),

    #[error("failed to subscribe to queue '{queue}': {source}")]
    Subscribe {
        queue: String,
        #[source]
        source: BrokerError,
    },
}

/// Maps each queue name to the single consumer that reads it.
#[derive(Default)]
pub struct ConsumerRegistry {
    consumers: BTreeMap<String, Arc<ChannelConsumer>>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, consumer: ChannelConsumer) -> Result<(), RegistryError> {
        let queue = consumer.queue().to_string();
        if self.consumers.contains_key(&queue) {
            return Err(RegistryError::DuplicateQueue(queue));
        }
        self.consumers.insert(queue, Arc::new(consumer));
        Ok(())
    }

    pub fn get(&self, queue: &str) -> Option<Arc<ChannelConsumer>> {
        self.consumers.get(queue).cloned()
    }

    pub fn queues(&self) -> Vec<String> {
        self.consumers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    /// Subscribes every registered queue, then spawns one independent task
    /// per queue. If any subscription fails nothing is spawned.
    pub async fn start(
        &self,
        broker: Arc<dyn Broker>,
        task_manager: &TaskManager,
    ) -> Result<(), RegistryError> {
        let mut subscriptions = Vec::with_capacity(self.consumers.len());
        for (queue, consumer) in &self.consumers {
            let stream = broker
                .subscribe(queue)
                .await
                .map_err(|source| RegistryError::Subscribe {
                    queue: queue.clone(),
                    source,
                })?;
            subscriptions.push((consumer.clone(), stream));
        }

        for (consumer, stream) in subscriptions {
            info!(
                queue = consumer.queue(),
                channel = consumer.channel().label(),
                "Starting consumer"
            );
            let task_name = consumer.channel().label();
            let run = consumer.run(broker.clone(), stream, task_manager.get_shutdown_rx());
            task_manager.spawn(task_name, run);
        }
        Ok(())
    }
}
