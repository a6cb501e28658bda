// Graceful shutdown coordination for the server and the export loop

use std::future::Future;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Coordinates shutdown between the HTTP listener and background tasks.
/// Shutdown is synchronous: the process does not exit until every task has
/// returned.
#[derive(Clone)]
pub struct Runtime {
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Runtime {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Get a receiver to watch for shutdown signals.
    /// Clone this and pass it to background tasks.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Trigger a programmatic shutdown.
    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Create a unified shutdown future that responds to both Ctrl+C and
    /// programmatic shutdown. Use this with axum's `with_graceful_shutdown()`.
    pub fn create_shutdown_future(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut shutdown_rx = self.shutdown_rx.clone();

        async move {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    eprintln!("\nShutdown signal (Ctrl+C) received...");
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        eprintln!("\nShutdown triggered by background task...");
                    }
                }
            }
        }
    }

    /// Propagate the shutdown flag and wait for background tasks to drain.
    pub async fn wait_for_shutdown_cleanup<T: 'static>(
        &self,
        service_name: &str,
        background_tasks: &mut JoinSet<T>,
    ) {
        self.trigger_shutdown();

        if !background_tasks.is_empty() {
            eprintln!("\nWaiting for background tasks to finish...");
            while let Some(result) = background_tasks.join_next().await {
                if let Err(e) = result {
                    eprintln!("Background task error: {}", e);
                }
            }
        }

        eprintln!("{} stopped", service_name);
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn test_programmatic_shutdown() {
        let runtime = Runtime::new();
        let mut rx = runtime.shutdown_signal();

        let rt_clone = runtime.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            rt_clone.trigger_shutdown();
        });

        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_shutdown_signal_cloning() {
        let runtime = Runtime::new();
        let mut rx1 = runtime.shutdown_signal();
        let mut rx2 = runtime.shutdown_signal();

        runtime.trigger_shutdown();

        rx1.changed().await.unwrap();
        rx2.changed().await.unwrap();

        assert!(*rx1.borrow());
        assert!(*rx2.borrow());
    }
}
