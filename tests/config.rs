//! Configuration layering: defaults, TOML file, environment, CLI.

use fanout_notify::{cli::Cli, config::Config, core::Channel};
use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn cli_with_config(file: &NamedTempFile) -> Cli {
    Cli {
        config: Some(file.path().to_path_buf()),
        ..Default::default()
    }
}

#[test]
#[serial]
fn test_defaults_without_any_source() {
    let config = Config::load(&Cli::default()).unwrap();

    assert_eq!(config, Config::default());
    assert_eq!(config.exchange.name, "eventos.fanout");
    assert_eq!(config.channels.get(Channel::Email).simulated_latency_ms, 1000);
    assert_eq!(config.channels.get(Channel::Sms).simulated_latency_ms, 800);
    assert_eq!(config.channels.get(Channel::Push).simulated_latency_ms, 500);
    assert_eq!(config.enabled_channels(), Channel::ALL.to_vec());
}

#[test]
#[serial]
fn test_toml_file_overrides_defaults() {
    let file = write_config(
        r#"
log_level = "debug"

[exchange]
name = "notifications.fanout"
durable = true

[channels.sms]
queue = "queue.sms"
enabled = false
"#,
    );

    let config = Config::load(&cli_with_config(&file)).unwrap();

    assert_eq!(config.log_level, "debug");
    assert_eq!(config.exchange.name, "notifications.fanout");
    assert_eq!(config.channels.sms.queue, "queue.sms");
    assert!(!config.channels.sms.enabled);
    assert_eq!(config.channels.email.queue, "fila.email");
    assert_eq!(config.enabled_channels(), vec![Channel::Email, Channel::Push]);
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let file = write_config(
        r#"
[exchange]
name = "from.file"
durable = true
"#,
    );
    std::env::set_var("FANOUT_EXCHANGE__NAME", "from.env");
    std::env::set_var("FANOUT_CHANNELS__PUSH__SIMULATED_LATENCY_MS", "5");

    let result = Config::load(&cli_with_config(&file));

    std::env::remove_var("FANOUT_EXCHANGE__NAME");
    std::env::remove_var("FANOUT_CHANNELS__PUSH__SIMULATED_LATENCY_MS");
    let config = result.unwrap();
    assert_eq!(config.exchange.name, "from.env");
    assert_eq!(config.channels.push.simulated_latency_ms, 5);
}

#[test]
#[serial]
fn test_cli_overrides_environment() {
    std::env::set_var("FANOUT_EXCHANGE__NAME", "from.env");
    let cli = Cli {
        exchange: Some("from.cli".to_string()),
        log_level: Some("warn".to_string()),
        ..Default::default()
    };

    let result = Config::load(&cli);

    std::env::remove_var("FANOUT_EXCHANGE__NAME");
    let config = result.unwrap();
    assert_eq!(config.exchange.name, "from.cli");
    assert_eq!(config.log_level, "warn");
}

#[test]
#[serial]
fn test_invalid_value_is_rejected() {
    let file = write_config(
        r#"
[channels.email]
queue = "fila.email"
simulated_latency_ms = "slow"
"#,
    );

    assert!(Config::load(&cli_with_config(&file)).is_err());
}

#[test]
#[serial]
fn test_metrics_section_from_file_and_environment() {
    let file = write_config(
        r#"
[metrics]
enabled = true
listen_address = "0.0.0.0:9100"
"#,
    );
    std::env::set_var("FANOUT_METRICS__ENABLED", "false");

    let result = Config::load(&cli_with_config(&file));

    std::env::remove_var("FANOUT_METRICS__ENABLED");
    let config = result.unwrap();
    assert!(!config.metrics.enabled);
    assert_eq!(config.metrics.listen_address.to_string(), "0.0.0.0:9100");
}
