//! The main application logic, decoupled from the entry point.

use crate::{
    broker::{Broker, InMemoryBroker},
    channels,
    config::Config,
    consumer::{ChannelConsumer, ConsumerRegistry},
    core::{Channel, ChannelSender},
    internal_metrics::MetricsBuilder,
    observability::{SharedObserver, TracingObserver},
    producer::EventProducer,
    task_manager::TaskManager,
    topology::Topology,
};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

/// A running application: declared topology, consumers spawned, producer ready.
pub struct App {
    task_manager: TaskManager,
    producer: EventProducer,
    topology: Topology,
    metrics_addr: Option<SocketAddr>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The publishing handle for callers such as an HTTP layer.
    pub fn producer(&self) -> EventProducer {
        self.producer.clone()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Where `/metrics` is served, if the endpoint is enabled.
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    /// Waits until `shutdown_rx` flips, then stops and awaits every consumer.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        while !*shutdown_rx.borrow() {
            if shutdown_rx.changed().await.is_err() {
                break;
            }
        }
        info!("Shutdown signal received. Waiting for consumers to finish...");
        self.task_manager.shutdown().await;
        Ok(())
    }

    /// Stops every consumer immediately and waits for them.
    pub async fn shutdown(self) {
        self.task_manager.shutdown().await;
    }
}

/// Builder for the main application.
///
/// Every collaborator can be overridden, which is how tests inject a failing
/// broker, a failing sender or a recording observer.
pub struct AppBuilder {
    config: Config,
    broker_override: Option<Arc<dyn Broker>>,
    observer_override: Option<SharedObserver>,
    sender_overrides: HashMap<Channel, Arc<dyn ChannelSender>>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            broker_override: None,
            observer_override: None,
            sender_overrides: HashMap::new(),
        }
    }

    /// Uses the given broker instead of a fresh in-memory one.
    pub fn broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker_override = Some(broker);
        self
    }

    pub fn observer(mut self, observer: SharedObserver) -> Self {
        self.observer_override = Some(observer);
        self
    }

    /// Replaces the default sender for the sender's channel.
    pub fn sender(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.sender_overrides.insert(sender.channel(), sender);
        self
    }

    /// Declares the topology, registers and starts one consumer per enabled
    /// channel, and returns the running `App`.
    ///
    /// Topology and subscription errors are fatal; no degraded mode is
    /// attempted.
    #[instrument(skip_all)]
    pub async fn build(mut self) -> Result<App> {
        let config = self.config;
        let broker: Arc<dyn Broker> = self
            .broker_override
            .unwrap_or_else(|| Arc::new(InMemoryBroker::new()));
        let observer: SharedObserver = self
            .observer_override
            .unwrap_or_else(|| Arc::new(TracingObserver::new()));

        // =========================================================================
        // 1. Declare Topology
        // =========================================================================
        let topology = Topology::from_config(&config);
        topology
            .declare(broker.as_ref())
            .await
            .context("failed to declare broker topology")?;

        // =========================================================================
        // 2. Initialize Metrics
        // =========================================================================
        let task_manager = TaskManager::new();
        let metrics_addr = match MetricsBuilder::new(config.metrics.clone())
            .build(task_manager.get_shutdown_rx())
        {
            Some((server, addr)) => {
                task_manager.spawn("MetricsServer", server.run());
                Some(addr)
            }
            None => None,
        };

        // =========================================================================
        // 3. Register Consumers
        // =========================================================================
        let mut registry = ConsumerRegistry::new();
        for (channel, queue) in &topology.queues {
            let sender = self
                .sender_overrides
                .remove(channel)
                .unwrap_or_else(|| channels::sender_for(*channel, config.channels.get(*channel)));
            debug!(channel = channel.label(), queue = %queue.name, "Registering consumer");
            registry.register(ChannelConsumer::new(
                queue.name.clone(),
                sender,
                observer.clone(),
            ))?;
        }

        // =========================================================================
        // 4. Start Consumers
        // =========================================================================
        registry
            .start(broker.clone(), &task_manager)
            .await
            .context("failed to start consumers")?;

        let producer = EventProducer::new(broker, topology.exchange.name.clone(), observer);
        info!(
            exchange = %topology.exchange.name,
            consumers = registry.len(),
            "Fanout notifier initialized"
        );

        Ok(App {
            task_manager,
            producer,
            topology,
            metrics_addr,
        })
    }
}
