//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using
//! the `clap` crate. Configuration flags are merged over the TOML file and
//! environment variables by implementing `figment::Provider`; the publish flags
//! describe an optional event to send once the topology is up.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Fans notification events out to email, SMS and push consumers.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log filter directive, e.g. "debug" or "fanout_notify=trace".
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Name of the fanout exchange to declare and publish to.
    #[arg(long, value_name = "NAME")]
    pub exchange: Option<String>,

    /// Kind label of an event to publish at startup.
    #[arg(long, requires_all = ["title", "body", "recipient"])]
    pub kind: Option<String>,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub body: Option<String>,

    #[arg(long)]
    pub recipient: Option<String>,
}

/// Fields of the startup event, present only when `--kind` was given.
#[derive(Debug, Clone, PartialEq)]
pub struct StartupEvent {
    pub kind: String,
    pub title: String,
    pub body: String,
    pub recipient: String,
}

impl Cli {
    pub fn startup_event(&self) -> Option<StartupEvent> {
        Some(StartupEvent {
            kind: self.kind.clone()?,
            title: self.title.clone()?,
            body: self.body.clone()?,
            recipient: self.recipient.clone()?,
        })
    }
}

fn insert_path(dict: &mut Dict, path: &[&str], value: Value) {
    match path {
        [] => {}
        [key] => {
            dict.insert((*key).to_string(), value);
        }
        [key, rest @ ..] => {
            let entry = dict
                .entry((*key).to_string())
                .or_insert_with(|| Value::from(Dict::new()));
            if let Value::Dict(_, nested) = entry {
                insert_path(nested, rest, value);
            }
        }
    }
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(level) = &self.log_level {
            insert_path(&mut dict, &["log_level"], Value::from(level.clone()));
        }

        if let Some(exchange) = &self.exchange {
            insert_path(&mut dict, &["exchange", "name"], Value::from(exchange.clone()));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
