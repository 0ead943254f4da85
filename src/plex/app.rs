//! The application: the live source plus lazily cloned versions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use super::source::{open_config, Source, SourceOptions};
use super::sources::Sources;
use super::teardown::Teardown;
use crate::bus::Broker;
use crate::config::ConfigStore;
use crate::vcs::{self, LIVE};
use crate::Result;

/// Wires all sources behind one broker.
///
/// Messages of each source are forwarded into the app broker under the
/// source's name, e.g. `live.tree.synced`.
pub struct App {
    live_path: PathBuf,
    options: SourceOptions,
    broker: Broker,
    config: Arc<ConfigStore>,
    sources: Arc<Sources>,
    teardown: Teardown,
    shutdown: CancellationToken,
}

impl App {
    /// Open the live source on `path` and register every version the
    /// config accepts as a lazy source. Call [`App::open_versions`] to
    /// clone them.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be read or the live source
    /// fails to open.
    pub async fn open(path: &Path, options: SourceOptions) -> Result<Self> {
        let live_path = std::path::absolute(path)?;
        let config = Arc::new(open_config(&live_path)?);
        let broker = Broker::new();
        let teardown = Teardown::new("app");

        let b = broker.clone();
        teardown.add_func("broker", move || {
            b.close();
            Ok(())
        });

        let sources = Arc::new(Sources::new(Arc::clone(&config)));
        let s = Arc::clone(&sources);
        teardown.add_async_func("sources", move || async move { s.close().await });

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        teardown.add_func("versions", move || {
            token.cancel();
            Ok(())
        });

        let app = Self {
            live_path,
            options,
            broker,
            config,
            sources,
            teardown,
            shutdown,
        };
        if let Err(e) = app.init().await {
            let _ = app.close().await;
            return Err(e);
        }
        Ok(app)
    }

    async fn init(&self) -> Result<()> {
        let live = Source::open(
            LIVE,
            &self.live_path,
            Arc::clone(&self.config),
            self.options.clone(),
        )
        .await?;
        self.add(Arc::clone(&live));

        if self.config.is_accepted_source(LIVE) {
            self.sources.select_primary(LIVE);
        }
        let Some(repo) = live.repo() else {
            tracing::info!("No multi-version support, serving live source only");
            self.sources.select_primary(LIVE);
            return Ok(());
        };

        let versions = match live.versions().await {
            Ok(versions) => versions,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to enumerate versions, serving live source only");
                self.sources.select_primary(LIVE);
                return Ok(());
            }
        };
        let subpath = self
            .live_path
            .strip_prefix(repo.path())
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let accepted = vcs::filter(&versions, |v| {
            !v.is_live() && self.config.is_accepted_source(&v.name)
        });
        for version in accepted {
            let repo = Arc::clone(&repo);
            let subpath = subpath.clone();
            let name = version.name.clone();

            let source = Source::lazy(
                &name,
                self.options.clone(),
                Box::new(move |source| {
                    async move { source.checkout_version(&repo, &version, &subpath).await }.boxed()
                }),
            );
            self.add(Arc::clone(&source));

            live.broker().on(vcs::TOPIC_CHANGED, move |_| {
                let source = Arc::clone(&source);
                async move {
                    if source.is_complete() {
                        source.update_from_upstream().await
                    } else {
                        Ok(())
                    }
                }
            });
        }

        if self.sources.get("").is_none() {
            let first = self.sources.whitelisted_names().into_iter().next();
            self.sources.select_primary(first.as_deref().unwrap_or(LIVE));
        }

        tracing::info!(
            sources = ?self.sources.names(),
            whitelisted = ?self.sources.whitelisted_names(),
            "Registered sources"
        );
        Ok(())
    }

    fn add(&self, source: Arc<Source>) {
        self.broker.connect(source.broker(), source.name());
        self.sources.add(source);
    }

    /// Complete all lazy sources in the background, one after another.
    pub fn open_versions(&self) {
        let sources = Arc::clone(&self.sources);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            for source in sources.all() {
                if source.is_complete() {
                    continue;
                }
                tokio::select! {
                    () = shutdown.cancelled() => return,
                    result = source.complete() => {
                        if let Err(e) = result {
                            tracing::warn!(source = source.name(), error = %e, "Failed to open version");
                        }
                    }
                }
            }
            tracing::info!("Opened all versions");
        });
    }

    /// Directory the live source serves.
    #[must_use]
    pub fn live_path(&self) -> &Path {
        &self.live_path
    }

    /// Global broker, carrying the messages of all sources.
    #[must_use]
    pub const fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Config of the live source; decides which sources are served.
    #[must_use]
    pub const fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    #[must_use]
    pub const fn sources(&self) -> &Arc<Sources> {
        &self.sources
    }

    /// Stop background work and close all sources, then the broker.
    ///
    /// # Errors
    ///
    /// Returns the last error encountered while closing.
    pub async fn close(&self) -> Result<()> {
        tracing::info!("Shutting down");
        self.teardown.close().await
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("live_path", &self.live_path)
            .field("sources", &self.sources)
            .finish_non_exhaustive()
    }
}
