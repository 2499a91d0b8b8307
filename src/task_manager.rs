//! Owns the consumer tasks and their shared shutdown signal.
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

type NamedHandle = (&'static str, JoinHandle<()>);

/// Tracks spawned tasks so they can be stopped and awaited together.
///
/// Every task receives a clone of the same `watch::Receiver<bool>`; flipping
/// it to `true` asks all of them to finish their current message and exit.
#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Vec<NamedHandle>>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskManager {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Spawns a task and keeps its handle.
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!(task_name = name, "Spawning task");
        let handle = tokio::spawn(future);
        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((name, handle));
    }

    pub fn get_shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub fn task_count(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Signals every task to stop without waiting for them.
    pub fn trigger_shutdown(&self) {
        // Only fails when no receiver is alive, i.e. nothing left to stop.
        let _ = self.shutdown_tx.send(true);
    }

    /// Signals shutdown and waits for all tasks, logging any that panicked.
    pub async fn shutdown(self) {
        self.trigger_shutdown();
        let handles: Vec<NamedHandle> = self
            .handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        info!(
            "TaskManager shutting down. Waiting for {} tasks to complete...",
            handles.len()
        );

        let (names, handles): (Vec<&'static str>, Vec<JoinHandle<()>>) =
            handles.into_iter().unzip();
        let results = join_all(handles).await;

        let mut panicked = 0;
        for (task_name, result) in names.into_iter().zip(results) {
            match result {
                Ok(()) => debug!(task_name, "Task shut down gracefully."),
                Err(e) => {
                    error!(task_name, error = %e, "Task panicked during shutdown.");
                    panicked += 1;
                }
            }
        }

        if panicked > 0 {
            error!("{} tasks panicked during shutdown", panicked);
        } else {
            info!("All tasks shut down gracefully.");
        }
    }
}
