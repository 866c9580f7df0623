//! Configuration hot reload.
//!
//! # Design Decisions
//! - Watches the parent directory: editors often replace the file by rename
//! - Only events touching the config file trigger a reload
//! - Invalid revisions are logged and dropped; identical ones are not resent

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::RouterConfig;

pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<RouterConfig>,
}

fn fingerprint(config: &RouterConfig) -> Option<String> {
    toml::to_string(config).ok()
}

fn touches(event: &Event, file_name: Option<&std::ffi::OsStr>) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
        && event.paths.iter().any(|p| p.file_name() == file_name)
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<RouterConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = path.file_name().map(|n| n.to_os_string());
        let last = Mutex::new(load_config(&path).ok().as_ref().and_then(fingerprint));
        let tx = self.update_tx;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if touches(&event, file_name.as_deref()) => match load_config(&path) {
                    Ok(config) => {
                        let print = fingerprint(&config);
                        let mut last = match last.lock() {
                            Ok(guard) => guard,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        if print.is_some() && *last == print {
                            return;
                        }
                        *last = print;
                        tracing::info!(path = ?path, "Config file changed, reloading");
                        let _ = tx.send(config);
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to reload config. Keeping current configuration."),
                },
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_changed_file_is_published_once_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("router.toml");
        std::fs::write(&path, "[listener]\nbind_address = \"127.0.0.1:8080\"\n").unwrap();

        let (watcher, mut updates) = ConfigWatcher::new(&path);
        let _handle = watcher.run().unwrap();

        std::fs::write(&path, "[listener]\nbind_address = \"nope\"\n").unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(&path, "[listener]\nbind_address = \"127.0.0.1:9999\"\n").unwrap();

        let config = tokio::time::timeout(Duration::from_secs(10), updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9999");
    }
}
