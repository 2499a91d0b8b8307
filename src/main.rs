//! Fanout Notify - notification fanout service
//!
//! Declares the exchange and channel queues, starts one consumer per channel,
//! optionally publishes a single event given on the command line, and runs
//! until Ctrl-C.

use anyhow::Result;
use clap::Parser;
use fanout_notify::{app::App, cli::Cli, config::Config, core::Event};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            tracing_subscriber::fmt().init();
            error!("Failed to load configuration: {}", err);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("Fanout notifier starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!(
        "Exchange: {} (durable: {})",
        config.exchange.name, config.exchange.durable
    );
    for channel in config.enabled_channels() {
        let channel_config = config.channels.get(channel);
        info!(
            "{} Queue: {} (simulated latency: {}ms)",
            channel.label(),
            channel_config.queue,
            channel_config.simulated_latency_ms
        );
    }
    if config.metrics.enabled {
        info!("Metrics: http://{}/metrics", config.metrics.listen_address);
    } else {
        info!("Metrics: disabled");
    }
    info!("-------------------------------------------------------");

    let app = App::builder(config).build().await?;

    if let Some(startup) = cli.startup_event() {
        let mut event = Event::new(startup.kind, startup.title, startup.body, startup.recipient);
        if !event.is_valid() {
            error!("Startup event is missing kind, title, body or recipient; not publishing");
        } else {
            match app.producer().publish(&mut event).await {
                Ok(()) => info!(event_id = %event.id, "{}", event.summary()),
                Err(e) => error!("Failed to publish startup event: {}", e),
            }
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = tokio::spawn(app.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Shutting down gracefully...");
    let _ = shutdown_tx.send(true);

    run.await??;
    info!("All consumers shut down. Exiting.");
    Ok(())
}
