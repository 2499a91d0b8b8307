//! Declarative broker topology: one fanout exchange, one durable queue per
//! channel, and an unconditional binding from the exchange to each queue.

use crate::broker::{Broker, BrokerError, ExchangeSpec, QueueSpec};
use crate::config::Config;
use crate::core::Channel;
use thiserror::Error;
use tracing::{info, instrument};

/// Fanout bindings carry no routing key.
const BINDING_KEY: &str = "";

#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("failed to declare exchange '{name}': {source}")]
    Exchange {
        name: String,
        #[source]
        source: BrokerError,
    },

    #[error("failed to declare queue '{name}': {source}")]
    Queue {
        name: String,
        #[source]
        source: BrokerError,
    },

    #[error("failed to bind queue '{queue}' to '{exchange}': {source}")]
    Binding {
        queue: String,
        exchange: String,
        #[source]
        source: BrokerError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSpec {
    pub queue: String,
    pub exchange: String,
}

/// Everything declared at startup. Read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    pub exchange: ExchangeSpec,
    pub queues: Vec<(Channel, QueueSpec)>,
    pub bindings: Vec<BindingSpec>,
}

impl Default for Topology {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Topology {
    /// Builds the topology for every enabled channel in the configuration.
    pub fn from_config(config: &Config) -> Self {
        let exchange = ExchangeSpec {
            name: config.exchange.name.clone(),
            durable: config.exchange.durable,
        };
        let queues: Vec<(Channel, QueueSpec)> = config
            .enabled_channels()
            .into_iter()
            .map(|channel| {
                let queue = &config.channels.get(channel).queue;
                (channel, QueueSpec::durable(queue.clone()))
            })
            .collect();
        let bindings = queues
            .iter()
            .map(|(_, queue)| BindingSpec {
                queue: queue.name.clone(),
                exchange: exchange.name.clone(),
            })
            .collect();

        Self {
            exchange,
            queues,
            bindings,
        }
    }

    pub fn queue_for(&self, channel: Channel) -> Option<&str> {
        self.queues
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, queue)| queue.name.as_str())
    }

    /// Declares the exchange, then each queue, then each binding.
    ///
    /// Safe to call again on every start: identical declarations are no-ops
    /// on the broker.
    #[instrument(skip_all, fields(exchange = %self.exchange.name))]
    pub async fn declare(&self, broker: &dyn Broker) -> Result<(), TopologyError> {
        broker
            .declare_exchange(&self.exchange)
            .await
            .map_err(|source| TopologyError::Exchange {
                name: self.exchange.name.clone(),
                source,
            })?;

        for (_, queue) in &self.queues {
            broker
                .declare_queue(queue)
                .await
                .map_err(|source| TopologyError::Queue {
                    name: queue.name.clone(),
                    source,
                })?;
        }

        for binding in &self.bindings {
            broker
                .bind_queue(&binding.queue, &binding.exchange, BINDING_KEY)
                .await
                .map_err(|source| TopologyError::Binding {
                    queue: binding.queue.clone(),
                    exchange: binding.exchange.clone(),
                    source,
                })?;
        }

        info!(
            queues = self.queues.len(),
            bindings = self.bindings.len(),
            "Topology declared"
        );
        Ok(())
    }
}
