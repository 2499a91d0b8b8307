/// Fanout Notify - distributes a single event to independent notification channels
///
/// A producer publishes each event once to a fanout exchange; the broker
/// copies it into one durable queue per channel (email, SMS, push), and each
/// channel's consumer processes its copy in isolation from the others.
pub mod app;
pub mod broker;
pub mod channels;
pub mod cli;
pub mod config;
pub mod consumer;
pub mod core;
pub mod factory;
pub mod internal_metrics;
pub mod observability;
pub mod producer;
pub mod task_manager;
pub mod topology;

// Re-export core types for convenience
pub use crate::core::*;
pub use factory::EventFactory;
pub use producer::{EventProducer, PublishError};
