//! A source: tree, search and stores for one version of the tree.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;

use super::teardown::Teardown;
use crate::author::{self, AuthorStore, TxtAuthorStore};
use crate::bus::Broker;
use crate::config::{ConfigStore, FileConfigStore, ServerConfig};
use crate::ddt::{nfc, NodeContext, Tree, TOPIC_SYNCED};
use crate::meta::MetaStore;
use crate::search::Search;
use crate::vcs::{self, Repo, Version};
use crate::watcher::FileWatcher;
use crate::{pathutil, Error, Result};

/// Published whenever files below the source root changed.
pub const TOPIC_FS_CHANGED: &str = "fs.changed";

/// Published once a lazy source finished opening.
pub const TOPIC_STATUS_CHANGED: &str = "source.status.changed";

/// Completes a lazy source, usually by calling [`Source::checkout_version`].
pub type CompleteFn = Box<dyn FnOnce(Arc<Source>) -> BoxFuture<'static, Result<()>> + Send>;

/// Settings shared by all sources of a process.
#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub debounce: Duration,
    pub repo_poll_interval: Duration,
    /// Persist search indexes below `<dir>/<source name>`.
    pub search_dir: Option<PathBuf>,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            debounce: crate::watcher::DEBOUNCE_DURATION,
            repo_poll_interval: vcs::POLL_INTERVAL,
            search_dir: None,
        }
    }
}

impl From<&ServerConfig> for SourceOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            debounce: config.debounce,
            repo_poll_interval: config.repo_poll_interval,
            search_dir: config.search_dir.clone(),
        }
    }
}

enum Origin {
    /// A working directory edited in place; changes come from a watcher.
    Live,
    /// A checkout owned by the source; changes come from its repository.
    Checkout(Arc<Repo>),
}

struct Opened {
    path: PathBuf,
    config: Arc<ConfigStore>,
    tree: Arc<Tree>,
    search: Arc<Search>,
    repo: Option<Arc<Repo>>,
}

/// Everything needed to serve one version of the tree.
///
/// A lazy source only has a name and a broker until [`Source::complete`]
/// opened it.
pub struct Source {
    name: String,
    options: SourceOptions,
    broker: Broker,
    teardown: Teardown,
    opened: OnceLock<Opened>,
    complete_fn: Mutex<Option<CompleteFn>>,
    completing: tokio::sync::Mutex<()>,
}

impl Source {
    fn empty(name: &str, options: SourceOptions) -> Self {
        let broker = Broker::new();
        let teardown = Teardown::new(format!("source {name}"));
        let b = broker.clone();
        teardown.add_func("broker", move || {
            b.close();
            Ok(())
        });

        Self {
            name: name.to_string(),
            options,
            broker,
            teardown,
            opened: OnceLock::new(),
            complete_fn: Mutex::new(None),
            completing: tokio::sync::Mutex::new(()),
        }
    }

    /// Open a source on a working directory that is edited in place.
    ///
    /// When the directory is inside a repository, modification times come
    /// from the commit log and versions can be enumerated. Changes are
    /// picked up by a filesystem watcher.
    ///
    /// # Errors
    ///
    /// Returns an error if watching, the initial sync or indexing fails,
    /// or the configured language is not supported.
    pub async fn open(
        name: &str,
        path: &Path,
        config: Arc<ConfigStore>,
        options: SourceOptions,
    ) -> Result<Arc<Self>> {
        let source = Arc::new(Self::empty(name, options));
        if let Err(e) = source.init(path, config, Origin::Live).await {
            let _ = source.close().await;
            return Err(e);
        }
        Ok(source)
    }

    /// A source that is opened later by `complete`.
    #[must_use]
    pub fn lazy(name: &str, options: SourceOptions, complete: CompleteFn) -> Arc<Self> {
        let source = Self::empty(name, options);
        *source.complete_fn.lock() = Some(complete);
        Arc::new(source)
    }

    async fn init(&self, path: &Path, config: Arc<ConfigStore>, origin: Origin) -> Result<()> {
        let path = std::path::absolute(path)?;
        tracing::info!(source = %self.name, path = %path.display(), "Opening source");

        let repo = match origin {
            Origin::Checkout(repo) => {
                let b = self.broker.clone();
                let id = self.broker.on(vcs::TOPIC_CHANGED, move |m| {
                    b.accept(TOPIC_FS_CHANGED, m.text);
                    async { Ok(()) }
                });
                self.unsubscribe_on_close(id);
                Some(repo)
            }
            Origin::Live => {
                let repo = self.discover_repo(&path);

                let watcher = FileWatcher::new(&path, self.options.debounce)?;
                self.broker.connect(watcher.broker(), "fs");
                self.teardown.add_func("watcher", move || watcher.close());
                repo
            }
        };

        if let Some(repo) = &repo {
            repo.start(self.options.repo_poll_interval);
            let r = Arc::clone(repo);
            self.teardown.add_func("repo", move || {
                r.close();
                Ok(())
            });
        }

        let meta = repo.as_ref().map_or(MetaStore::Fs, |r| MetaStore::Chain(Arc::clone(r)));
        let authors = Arc::new(open_authors(&path));

        let ctx = Arc::new(NodeContext {
            root: path.clone(),
            config: Arc::clone(&config),
            meta,
            authors: Arc::clone(&authors),
        });
        let tree = Arc::new(Tree::new(ctx, self.name.clone(), self.broker.clone()));
        let search = Arc::new(Search::new(
            Arc::clone(&tree),
            &config.data().lang,
            self.options.search_dir.as_ref().map(|d| d.join(&self.name)),
        )?);

        tree.sync().await?;
        search.refresh().await?;

        let s = Arc::clone(&search);
        self.teardown.add_func("search", move || {
            s.close();
            Ok(())
        });

        let (t, c, a) = (Arc::clone(&tree), Arc::clone(&config), authors);
        let id = self.broker.on(TOPIC_FS_CHANGED, move |_| {
            let (t, c, a) = (Arc::clone(&t), Arc::clone(&c), Arc::clone(&a));
            async move {
                if let Err(e) = c.refresh() {
                    tracing::warn!(error = %e, "Failed to refresh config");
                }
                if let Err(e) = a.refresh() {
                    tracing::warn!(error = %e, "Failed to refresh authors");
                }
                t.sync().await
            }
        });
        self.unsubscribe_on_close(id);

        let s = Arc::clone(&search);
        let id = self.broker.on(TOPIC_SYNCED, move |_| {
            let s = Arc::clone(&s);
            async move { s.refresh().await }
        });
        self.unsubscribe_on_close(id);

        self.opened
            .set(Opened {
                path,
                config,
                tree,
                search,
                repo,
            })
            .map_err(|_| Error::internal(format!("source {} opened twice", self.name)))
    }

    fn discover_repo(&self, path: &Path) -> Option<Arc<Repo>> {
        let location = match vcs::find_repo(path) {
            Ok(Some(location)) => location,
            Ok(None) => {
                tracing::info!(source = %self.name, "No repository found, multi-version support disabled");
                return None;
            }
            Err(e) => {
                tracing::warn!(source = %self.name, error = %e, "Failed to look for repository");
                return None;
            }
        };
        match Repo::open(&location.main, location.submodule.as_deref(), self.broker.clone()) {
            Ok(repo) => Some(repo),
            Err(e) => {
                tracing::warn!(source = %self.name, error = %e, "Failed to open repository");
                None
            }
        }
    }

    fn unsubscribe_on_close(&self, id: u64) {
        let b = self.broker.clone();
        self.teardown.add_func("unsubscribe", move || {
            b.unsubscribe(id);
            Ok(())
        });
    }

    /// Clone `repo` at `version` into a temporary directory and open the
    /// source on it. `subpath` locates the tree root inside the checkout.
    ///
    /// The temporary directory is removed when the source is closed.
    ///
    /// # Errors
    ///
    /// Returns an error if cloning or opening fails.
    pub async fn checkout_version(&self, repo: &Repo, version: &Version, subpath: &Path) -> Result<()> {
        let tmp = tempfile::Builder::new()
            .prefix(&format!("dsk{}", self.name))
            .tempdir()?;
        let dir = tmp.path().to_path_buf();
        self.teardown.add_async_func("checkout", move || async move {
            tokio::task::spawn_blocking(move || tmp.close())
                .await
                .map_err(|e| Error::internal(format!("removal task failed: {e}")))?
                .map_err(Error::from)
        });

        repo.checkout_into(version, &dir).await?;
        let checkout = Repo::open(&dir, None, self.broker.clone())?;

        let root = if subpath.as_os_str().is_empty() {
            dir
        } else {
            dir.join(subpath)
        };
        let config = Arc::new(open_config(&root)?);
        self.init(&root, config, Origin::Checkout(checkout)).await
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Broker carrying this source's messages.
    #[must_use]
    pub const fn broker(&self) -> &Broker {
        &self.broker
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.opened.get().is_some()
    }

    /// Open a lazy source. Does nothing when already open.
    ///
    /// # Errors
    ///
    /// Returns an error if the source has no way to complete or the
    /// completion fails. A failed completion is not retried.
    pub async fn complete(self: &Arc<Self>) -> Result<()> {
        let _guard = self.completing.lock().await;
        if self.is_complete() {
            return Ok(());
        }
        let Some(f) = self.complete_fn.lock().take() else {
            return Err(Error::SourceIncomplete(self.name.clone()));
        };

        f(Arc::clone(self)).await?;
        tracing::info!(source = %self.name, "Completed lazy source");
        self.broker.accept(TOPIC_STATUS_CHANGED, "completed");
        Ok(())
    }

    fn opened(&self) -> Result<&Opened> {
        self.opened
            .get()
            .ok_or_else(|| Error::SourceIncomplete(self.name.clone()))
    }

    /// Root directory of the tree.
    ///
    /// # Errors
    ///
    /// Returns an error while the source is not complete.
    pub fn path(&self) -> Result<&Path> {
        Ok(&self.opened()?.path)
    }

    /// # Errors
    ///
    /// Returns an error while the source is not complete.
    pub fn tree(&self) -> Result<Arc<Tree>> {
        Ok(Arc::clone(&self.opened()?.tree))
    }

    /// # Errors
    ///
    /// Returns an error while the source is not complete.
    pub fn search(&self) -> Result<Arc<Search>> {
        Ok(Arc::clone(&self.opened()?.search))
    }

    /// # Errors
    ///
    /// Returns an error while the source is not complete.
    pub fn config(&self) -> Result<Arc<ConfigStore>> {
        Ok(Arc::clone(&self.opened()?.config))
    }

    #[must_use]
    pub fn repo(&self) -> Option<Arc<Repo>> {
        self.opened.get().and_then(|o| o.repo.clone())
    }

    /// Whether other versions can be cloned from this source.
    #[must_use]
    pub fn has_multi_versions_support(&self) -> bool {
        self.repo().is_some()
    }

    /// Versions available in the repository; empty without one.
    ///
    /// # Errors
    ///
    /// Returns an error if the versions cannot be enumerated.
    pub async fn versions(&self) -> Result<Vec<Version>> {
        match self.repo() {
            Some(repo) => repo.versions().await,
            None => Ok(Vec::new()),
        }
    }

    /// Pull upstream changes into the repository; a no-op without one.
    ///
    /// # Errors
    ///
    /// Returns an error if fetching or checking out fails.
    pub async fn update_from_upstream(&self) -> Result<()> {
        match self.repo() {
            Some(repo) => repo.update_from_upstream().await,
            None => Ok(()),
        }
    }

    /// Close everything the source opened, in reverse order.
    ///
    /// # Errors
    ///
    /// Returns the last error encountered while closing.
    pub async fn close(&self) -> Result<()> {
        tracing::debug!(source = %self.name, "Closing source");
        self.teardown.close().await
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("name", &self.name)
            .field("complete", &self.is_complete())
            .field("path", &self.opened.get().map(|o| pathutil::pretty(&o.path, &o.path)))
            .finish_non_exhaustive()
    }
}

/// Config for a tree root: the config file when there is one, defaults
/// named after the directory otherwise.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read.
pub fn open_config(root: &Path) -> Result<ConfigStore> {
    let project = root
        .file_name()
        .map(|n| nfc(&n.to_string_lossy()))
        .unwrap_or_default();
    match crate::config::find_file(root)? {
        Some(file) => Ok(ConfigStore::File(FileConfigStore::open(file, project)?)),
        None => Ok(ConfigStore::static_defaults(project)),
    }
}

fn open_authors(root: &Path) -> AuthorStore {
    let Some(file) = author::find_file(root) else {
        return AuthorStore::Noop;
    };
    match TxtAuthorStore::open(&file) {
        Ok(db) => AuthorStore::Txt(db),
        Err(e) => {
            tracing::warn!(path = %file.display(), error = %e, "Failed to read authors, ignoring");
            AuthorStore::Noop
        }
    }
}
