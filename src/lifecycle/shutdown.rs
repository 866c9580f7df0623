//! Shutdown coordination for the router's long-running tasks.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// Broadcast coordinator; every server loop and the retention sweeper
/// hold one receiver.
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let subscribers = self.tx.receiver_count();
        tracing::info!(subscribers, "Shutdown triggered");
        let _ = self.tx.send(());
    }

    /// Wait for `tasks` to finish, aborting what is left after `grace`.
    pub async fn drain(tasks: &mut JoinSet<()>, grace: Duration) {
        let drained = tokio::time::timeout(grace, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Task failed during shutdown");
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(remaining = tasks.len(), "Grace period elapsed, aborting tasks");
            tasks.abort_all();
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_reaches_every_subscriber() {
        let shutdown = Shutdown::new();
        let mut tasks = JoinSet::new();
        for _ in 0..3 {
            let mut rx = shutdown.subscribe();
            tasks.spawn(async move {
                let _ = rx.recv().await;
            });
        }
        shutdown.trigger();
        Shutdown::drain(&mut tasks, Duration::from_secs(5)).await;
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_drain_aborts_after_grace() {
        let mut tasks = JoinSet::new();
        tasks.spawn(std::future::pending::<()>());
        Shutdown::drain(&mut tasks, Duration::from_millis(20)).await;
        while tasks.join_next().await.is_some() {}
        assert!(tasks.is_empty());
    }
}
