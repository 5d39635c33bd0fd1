//! Configuration file watcher
//!
//! Turns file system notifications for a configuration file into
//! [`FileChangeEvent`]s that [`ConfigManager::spawn_event_loop`] consumes.
//!
//! [`ConfigManager::spawn_event_loop`]: crate::config::ConfigManager::spawn_event_loop

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, error, info};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Poll interval for platforms without native notifications
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// A configuration file changed on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeEvent {
    pub path: PathBuf,
}

/// Watches one configuration file
pub struct ConfigWatcher {
    path: PathBuf,
    tx: mpsc::UnboundedSender<FileChangeEvent>,
}

impl ConfigWatcher {
    /// Create a watcher for `path`.
    ///
    /// Returns the watcher and the receiver for change events.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<FileChangeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                tx,
            },
            rx,
        )
    }

    /// Start watching. Events stop when the returned watcher is dropped.
    ///
    /// The parent directory is watched so that editors replacing the file
    /// through a rename are noticed as well.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name: Option<OsString> = self.path.file_name().map(|n| n.to_os_string());
        let path = self.path.clone();
        let tx = self.tx;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    let relevant = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if relevant {
                        debug!("Configuration file change detected: {}", path.display());
                        let _ = tx.send(FileChangeEvent { path: path.clone() });
                    }
                }
                Err(e) => error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(POLL_INTERVAL),
        )?;

        watcher.watch(&directory, RecursiveMode::NonRecursive)?;
        info!("Configuration watcher started for {}", self.path.display());
        Ok(watcher)
    }
}
