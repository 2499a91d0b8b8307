//! Configuration management.
//!
//! This module defines the main `Config` struct and its sub-structs. It uses
//! the `figment` crate to layer built-in defaults, an optional TOML file,
//! `FANOUT_`-prefixed environment variables and command-line arguments, in
//! that order of increasing precedence.

use crate::cli::Cli;
use crate::core::Channel;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level (an `EnvFilter` directive).
    pub log_level: String,
    /// Exchange declaration settings.
    pub exchange: ExchangeConfig,
    /// Per-channel queue and sender settings.
    pub channels: ChannelsConfig,
    /// Prometheus endpoint settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Configuration for the Prometheus `/metrics` endpoint.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Port 0 picks a free port.
    pub listen_address: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_address: SocketAddr::from((Ipv4Addr::LOCALHOST, 9898)),
        }
    }
}

/// Configuration for the fanout exchange.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExchangeConfig {
    pub name: String,
    /// Whether the exchange survives a broker restart.
    pub durable: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChannelsConfig {
    pub email: ChannelConfig,
    pub sms: ChannelConfig,
    pub push: ChannelConfig,
}

impl ChannelsConfig {
    pub fn get(&self, channel: Channel) -> &ChannelConfig {
        match channel {
            Channel::Email => &self.email,
            Channel::Sms => &self.sms,
            Channel::Push => &self.push,
        }
    }
}

/// Configuration for a single notification channel.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Name of the durable queue bound to the exchange.
    pub queue: String,
    /// Disabled channels get neither a queue nor a consumer.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// How long the placeholder sender holds the consumer per message.
    #[serde(default)]
    pub simulated_latency_ms: u64,
}

fn enabled_by_default() -> bool {
    true
}

impl ChannelConfig {
    fn for_channel(channel: Channel, simulated_latency_ms: u64) -> Self {
        Self {
            queue: channel.default_queue().to_string(),
            enabled: true,
            simulated_latency_ms,
        }
    }
}

impl Config {
    /// Loads configuration from every source, with the CLI taking precedence.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(path) = &cli.config {
            figment = figment.merge(Toml::file(path));
        }
        let config = figment
            // e.g. FANOUT_EXCHANGE__NAME=events or FANOUT_CHANNELS__SMS__ENABLED=false
            .merge(Env::prefixed("FANOUT_").split("__"))
            .merge(cli.clone())
            .extract()?;
        Ok(config)
    }

    /// Enabled channels in declaration order.
    pub fn enabled_channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|channel| self.channels.get(*channel).enabled)
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            exchange: ExchangeConfig {
                name: "eventos.fanout".to_string(),
                durable: true,
            },
            channels: ChannelsConfig {
                email: ChannelConfig::for_channel(Channel::Email, 1000),
                sms: ChannelConfig::for_channel(Channel::Sms, 800),
                push: ChannelConfig::for_channel(Channel::Push, 500),
            },
            metrics: MetricsConfig::default(),
        }
    }
}
