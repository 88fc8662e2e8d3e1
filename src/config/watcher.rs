//! Hot reload of the YAML config file
//!
//! The parent directory is watched rather than the file itself so that editors
//! that save by renaming a temp file over the original still trigger a reload.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppConfig;

/// Delay before re-reading, lets the writer finish
const DEBOUNCE: Duration = Duration::from_millis(100);

/// Pushes each successfully re-parsed config through a channel
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<AppConfig>,
}

impl ConfigWatcher {
    /// Load `config_path` and start watching it
    pub async fn new(config_path: String) -> Result<(Self, Arc<AppConfig>)> {
        let initial = AppConfig::load(&config_path)
            .await
            .context("Failed to load initial config")?;

        let file = PathBuf::from(&config_path);
        let dir = match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = file.file_name().map(|n| n.to_os_string());

        let (tx, rx) = mpsc::channel(10);
        // notify calls back on its own thread
        let runtime = Handle::current();
        let path: Arc<str> = Arc::from(config_path.as_str());

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    error!("Config watch error: {}", e);
                    return;
                },
            };
            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                return;
            }
            let touches_config = event
                .paths
                .iter()
                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
            if !touches_config {
                return;
            }

            debug!("Config file changed: {:?}", event.paths);
            runtime.spawn(reload(Arc::clone(&path), tx.clone()));
        })?;

        watcher
            .watch(dir.as_path(), RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config directory: {}", dir.display()))?;

        info!("Watching {} for changes", config_path);

        Ok((
            Self {
                _watcher: watcher,
                rx,
            },
            Arc::new(initial),
        ))
    }

    /// Next reloaded config, or None once the watcher is gone
    pub async fn next_config(&mut self) -> Option<AppConfig> {
        self.rx.recv().await
    }
}

async fn reload(path: Arc<str>, tx: mpsc::Sender<AppConfig>) {
    tokio::time::sleep(DEBOUNCE).await;

    match AppConfig::load(&path).await {
        Ok(config) => {
            info!(
                "Configuration reloaded ({} {}:{})",
                config.connection.protocol, config.connection.host, config.connection.target_port
            );
            if let Err(e) = tx.send(config).await {
                error!("Failed to forward config update: {}", e);
            }
        },
        Err(e) => warn!("Config reload failed, keeping the running config: {:#}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_watcher_reloads_connection() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("test-config.yaml");

        let initial_config = r#"
connection:
  host: "127.0.0.1"
  target_port: 8000
"#;
        fs::write(&config_path, initial_config)?;

        let (mut watcher, config) =
            ConfigWatcher::new(config_path.to_string_lossy().to_string()).await?;
        assert_eq!(config.connection.host, "127.0.0.1");
        assert_eq!(config.connection.target_port, 8000);

        let modified_config = r#"
connection:
  host: "console.local"
  target_port: 9000
  protocol: tcp
"#;

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&config_path, modified_config)?;

        let new_config = tokio::time::timeout(Duration::from_secs(2), watcher.next_config()).await?;

        if let Some(new_config) = new_config {
            assert_eq!(new_config.connection.host, "console.local");
            assert_eq!(new_config.connection.target_port, 9000);
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_initial_config_is_an_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("broken.yaml");
        fs::write(&config_path, "connection: [not, a, map]")?;

        let result = ConfigWatcher::new(config_path.to_string_lossy().to_string()).await;
        assert!(result.is_err());
        Ok(())
    }
}
