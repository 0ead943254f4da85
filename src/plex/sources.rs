//! Registry of all sources of a process.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use super::source::Source;
use crate::config::ConfigStore;
use crate::{Error, Result};

#[derive(Default)]
struct Registry {
    /// In insertion order.
    sources: Vec<Arc<Source>>,
    primary: Option<String>,
}

/// Name and readiness of a source, as listed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub is_ready: bool,
}

/// Sources by name, plus the one served when no name is given.
pub struct Sources {
    config: Arc<ConfigStore>,
    registry: RwLock<Registry>,
}

impl Sources {
    /// An empty registry; `config` decides which sources are listed.
    #[must_use]
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self {
            config,
            registry: RwLock::new(Registry::default()),
        }
    }

    /// Register a source, replacing one with the same name.
    pub fn add(&self, source: Arc<Source>) {
        let mut registry = self.registry.write();
        match registry.sources.iter_mut().find(|s| s.name() == source.name()) {
            Some(existing) => *existing = source,
            None => registry.sources.push(source),
        }
    }

    /// Serve `name` when no source is requested.
    pub fn select_primary(&self, name: &str) {
        tracing::debug!(source = name, "Selected primary source");
        self.registry.write().primary = Some(name.to_string());
    }

    /// Source by name; the empty name is the primary source.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Source>> {
        let registry = self.registry.read();
        let name = if name.is_empty() {
            registry.primary.as_deref()?
        } else {
            name
        };
        registry.sources.iter().find(|s| s.name() == name).cloned()
    }

    /// Like [`Sources::get`] but failing for unknown names.
    ///
    /// # Errors
    ///
    /// Returns a not found error if there is no such source, or no primary
    /// source was selected for the empty name.
    pub fn must_get(&self, name: &str) -> Result<Arc<Source>> {
        self.get(name).ok_or_else(|| {
            if name.is_empty() {
                Error::not_found("no primary source selected")
            } else {
                Error::not_found(format!("unknown source: {name}"))
            }
        })
    }

    /// All sources in insertion order.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<Source>> {
        self.registry.read().sources.clone()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.all().iter().map(|s| s.name().to_string()).collect()
    }

    /// Names of the sources the config accepts, in insertion order.
    #[must_use]
    pub fn whitelisted_names(&self) -> Vec<String> {
        self.all()
            .iter()
            .map(|s| s.name().to_string())
            .filter(|n| self.config.is_accepted_source(n))
            .collect()
    }

    /// Readiness of the whitelisted sources.
    #[must_use]
    pub fn statuses(&self) -> Vec<SourceStatus> {
        self.all()
            .iter()
            .filter(|s| self.config.is_accepted_source(s.name()))
            .map(|s| SourceStatus {
                name: s.name().to_string(),
                is_ready: s.is_complete(),
            })
            .collect()
    }

    /// Call `f` for every source in insertion order, stopping at the first
    /// error.
    ///
    /// # Errors
    ///
    /// Returns the first error `f` returned.
    pub fn for_each(&self, mut f: impl FnMut(&Arc<Source>) -> Result<()>) -> Result<()> {
        for source in self.all() {
            f(&source)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.read().sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.read().sources.is_empty()
    }

    /// Close all sources, most recently added first.
    ///
    /// # Errors
    ///
    /// Returns the last error encountered; all sources are closed
    /// regardless.
    pub async fn close(&self) -> Result<()> {
        let mut last_err = None;
        for source in self.all().iter().rev() {
            if let Err(e) = source.close().await {
                tracing::warn!(source = source.name(), error = %e, "Failed to close source");
                last_err = Some(e);
            }
        }
        last_err.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for Sources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.read();
        f.debug_struct("Sources")
            .field("names", &registry.sources.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("primary", &registry.primary)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileConfigStore;
    use crate::plex::SourceOptions;
    use futures::FutureExt;
    use tempfile::TempDir;

    fn lazy(name: &str) -> Arc<Source> {
        Source::lazy(
            name,
            SourceOptions::default(),
            Box::new(|_| async { Ok(()) }.boxed()),
        )
    }

    fn sources(names: &[&str]) -> Sources {
        let sources = Sources::new(Arc::new(ConfigStore::static_defaults("example")));
        for name in names {
            sources.add(lazy(name));
        }
        sources
    }

    #[tokio::test]
    async fn test_get_and_primary() {
        let sources = sources(&["live", "v1.0.0"]);
        assert!(sources.get("").is_none());
        assert!(sources.must_get("").is_err());

        sources.select_primary("live");
        assert_eq!(sources.get("").unwrap().name(), "live");
        assert_eq!(sources.must_get("v1.0.0").unwrap().name(), "v1.0.0");

        let err = sources.must_get("v2.0.0").unwrap_err();
        assert_eq!(err.to_string(), "not found: unknown source: v2.0.0");
    }

    #[tokio::test]
    async fn test_insertion_order() {
        let sources = sources(&["live", "v2.0.0", "v1.0.0"]);
        assert_eq!(sources.names(), vec!["live", "v2.0.0", "v1.0.0"]);

        let mut seen = Vec::new();
        sources
            .for_each(|s| {
                seen.push(s.name().to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, sources.names());
    }

    #[tokio::test]
    async fn test_add_replaces_same_name() {
        let sources = sources(&["live", "v1.0.0"]);
        sources.add(lazy("live"));
        assert_eq!(sources.len(), 2);
        assert_eq!(sources.names(), vec!["live", "v1.0.0"]);
    }

    #[tokio::test]
    async fn test_whitelisted_names() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("dsk.yaml");
        std::fs::write(&file, "sources:\n  - live\n  - v1.*\n").unwrap();
        let config = ConfigStore::File(FileConfigStore::open(&file, "example").unwrap());

        let sources = Sources::new(Arc::new(config));
        for name in ["live", "v1.0.0", "v2.0.0", "v1.1.0"] {
            sources.add(lazy(name));
        }
        assert_eq!(sources.whitelisted_names(), vec!["live", "v1.0.0", "v1.1.0"]);

        let statuses = sources.statuses();
        assert_eq!(statuses.len(), 3);
        assert!(statuses.iter().all(|s| !s.is_ready));
    }

    #[tokio::test]
    async fn test_static_config_lists_only_live() {
        let sources = sources(&["live", "v1.0.0"]);
        assert_eq!(sources.whitelisted_names(), vec!["live"]);
    }

    #[tokio::test]
    async fn test_close() {
        let sources = sources(&["live", "v1.0.0"]);
        sources.close().await.unwrap();
    }
}
