//! Graceful shutdown of a running app.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

mod helpers;
use fanout_notify::core::Channel;
use helpers::{
    mock_sender::{HangingSender, RecordingSender},
    TestApp,
};

/// Runs the app in the background and asserts it stops promptly once the
/// shutdown signal flips. A hang here means a consumer ignored the signal.
#[tokio::test]
async fn test_app_shuts_down_within_timeout() -> Result<()> {
    let email = RecordingSender::new(Channel::Email);
    let test_app = TestApp::start(|builder| builder.sender(Arc::new(email.clone()))).await;
    let producer = test_app.app.producer();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = tokio::spawn(test_app.app.run(shutdown_rx));

    producer
        .publish_notification("TESTE", "Before shutdown", "body", "a@b.com")
        .await?;
    email.wait_for_count(1, Duration::from_secs(2)).await;
    let broker = test_app.broker.clone();
    tokio::time::timeout(Duration::from_secs(2), async {
        while broker.acked_count("fila.email") == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;

    shutdown_tx.send(true)?;
    tokio::time::timeout(Duration::from_secs(5), run).await???;

    assert_eq!(test_app.broker.unacked_count("fila.email"), 0);
    Ok(())
}

#[tokio::test]
async fn test_messages_published_after_shutdown_stay_queued() -> Result<()> {
    let test_app = TestApp::start(|builder| builder).await;
    let producer = test_app.app.producer();

    test_app.app.shutdown().await;
    producer
        .publish_notification("TESTE", "Late", "body", "a@b.com")
        .await?;

    for channel in Channel::ALL {
        assert_eq!(test_app.broker.ready_count(channel.default_queue()), 1);
    }
    Ok(())
}

#[tokio::test]
async fn test_stalled_sender_does_not_block_shutdown() -> Result<()> {
    let test_app =
        TestApp::start(|builder| builder.sender(Arc::new(HangingSender::new(Channel::Email))))
            .await;
    let producer = test_app.app.producer();
    producer
        .publish_notification("TESTE", "Stuck", "body", "a@b.com")
        .await?;
    let broker = test_app.broker.clone();
    tokio::time::timeout(Duration::from_secs(2), async {
        while broker.ready_count("fila.email") > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = tokio::spawn(test_app.app.run(shutdown_rx));
    shutdown_tx.send(true)?;
    tokio::time::timeout(Duration::from_secs(3), run).await???;

    // The interrupted email stays unacked and is handed out again on recovery.
    assert_eq!(test_app.broker.unacked_count("fila.email"), 1);
    assert_eq!(test_app.broker.recover("fila.email")?, 1);
    Ok(())
}
