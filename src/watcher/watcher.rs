//! Recursive directory watcher using notify-rs.

#![allow(clippy::used_underscore_binding)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind, Debouncer};

use super::events::ChangeBatch;
use crate::bus::Broker;
use crate::error::WatcherError;
use crate::pathutil;
use crate::Result;

/// Default debounce duration for file events.
pub const DEBOUNCE_DURATION: Duration = Duration::from_millis(250);

/// Topic published for every debounced batch of changes.
pub const TOPIC_CHANGED: &str = "changed";

/// Watches a directory tree and publishes `changed` messages.
///
/// Each debounced batch yields at most one message whose text is the
/// pretty path of the first changed file. Connect [`FileWatcher::broker`]
/// into another broker under a namespace (usually `fs`) to receive them
/// as `fs.changed`.
pub struct FileWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    root: PathBuf,
    broker: Broker,
}

impl FileWatcher {
    /// Start watching `root` recursively.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory does not exist or cannot be watched.
    pub fn new(root: impl AsRef<Path>, debounce: Duration) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(WatcherError::WatchFailed {
                path: root.display().to_string(),
                reason: "directory does not exist".to_string(),
            }
            .into());
        }
        // Backends report canonical paths.
        let root = root.canonicalize()?;
        tracing::info!(path = %root.display(), "Initializing watcher");

        let broker = Broker::new();
        let publish = broker.clone();
        let event_root = root.clone();

        let mut debouncer = new_debouncer(
            debounce,
            move |result: std::result::Result<
                Vec<notify_debouncer_mini::DebouncedEvent>,
                notify::Error,
            >| {
                match result {
                    Ok(events) => {
                        let mut batch = ChangeBatch::new();
                        for event in events {
                            if matches!(
                                event.kind,
                                DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous
                            ) {
                                batch.add(&event_root, &event.path);
                            }
                        }
                        if let Some(first) = batch.first() {
                            let pretty = pathutil::pretty(&event_root, &event_root.join(first));
                            tracing::info!(path = %pretty, count = batch.len(), "Change detected");
                            publish.accept(TOPIC_CHANGED, pretty);
                        }
                    }
                    Err(e) => {
                        tracing::error!("Watch error: {:?}", e);
                    }
                }
            },
        )
        .map_err(|e| WatcherError::WatchFailed {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;

        debouncer
            .watcher()
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| WatcherError::WatchFailed {
                path: root.display().to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            _debouncer: debouncer,
            root,
            broker,
        })
    }

    /// The broker changes are published on.
    #[must_use]
    pub const fn broker(&self) -> &Broker {
        &self.broker
    }

    /// The watched root, canonicalized.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Release all watches and close subscribers.
    ///
    /// # Errors
    ///
    /// Returns an error if unwatching fails; subscribers are closed anyway.
    pub fn close(mut self) -> Result<()> {
        tracing::info!(path = %self.root.display(), "Stopping watcher");
        let result = self
            ._debouncer
            .watcher()
            .unwatch(&self.root)
            .map_err(|e| WatcherError::WatchFailed {
                path: self.root.display().to_string(),
                reason: e.to_string(),
            });
        self.broker.close();
        result.map_err(Into::into)
    }
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_watcher_nonexistent_dir() {
        let result = FileWatcher::new("/nonexistent/directory", DEBOUNCE_DURATION);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_watcher_publishes_change() {
        let tmp = TempDir::new().unwrap();
        let watcher = FileWatcher::new(tmp.path(), Duration::from_millis(50)).unwrap();
        let mut sub = watcher.broker().subscribe(TOPIC_CHANGED);

        std::fs::create_dir(tmp.path().join("foo")).unwrap();
        std::fs::write(tmp.path().join("foo/readme.md"), "# Hi").unwrap();

        let m = timeout(Duration::from_secs(5), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(m.text.contains("foo"));
        assert!(!m.text.starts_with('/'));

        watcher.close().unwrap();
    }

    #[tokio::test]
    async fn test_watcher_close_closes_subscribers() {
        let tmp = TempDir::new().unwrap();
        let watcher = FileWatcher::new(tmp.path(), DEBOUNCE_DURATION).unwrap();
        let mut sub = watcher.broker().subscribe("*");

        watcher.close().unwrap();
        let next = timeout(Duration::from_secs(2), sub.recv()).await.unwrap();
        assert!(next.is_none());
    }
}
