//! The design definitions tree: all nodes below a root directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use walkdir::WalkDir;

use super::node::{Node, NodeContext, NodeGetter};
use super::url::lookup_node_url;
use crate::bus::Broker;
use crate::error::TreeError;
use crate::pathutil;
use crate::server::metrics::{TREE_SYNCS, TREE_SYNC_DURATION};
use crate::{Error, Result};

/// Topic published after each completed sync.
pub const TOPIC_SYNCED: &str = "tree.synced";

#[derive(Default)]
struct TreeState {
    /// Nodes keyed by their lookup URL.
    lookup: HashMap<String, Arc<Node>>,
    /// Unnormalized URLs, sorted; defines neighbor order.
    ordered: Vec<String>,
    root: Option<Arc<Node>>,
}

/// All nodes of one source.
///
/// Nodes are rebuilt from scratch on every sync and swapped in at once;
/// readers see either the previous or the new tree, never a mix.
pub struct Tree {
    path: PathBuf,
    ctx: Arc<NodeContext>,
    source: String,
    broker: Broker,
    state: RwLock<TreeState>,
    syncing: tokio::sync::Mutex<()>,
}

impl Tree {
    /// Create an empty tree; call [`Tree::sync`] to populate it.
    #[must_use]
    pub fn new(ctx: Arc<NodeContext>, source: impl Into<String>, broker: Broker) -> Self {
        Self {
            path: ctx.root.clone(),
            ctx,
            source: source.into(),
            broker,
            state: RwLock::new(TreeState::default()),
            syncing: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stores shared by all nodes.
    #[must_use]
    pub const fn context(&self) -> &Arc<NodeContext> {
        &self.ctx
    }

    /// Walk the root directory and replace all nodes.
    ///
    /// Only one sync runs at a time; concurrent calls wait. On error the
    /// previous nodes stay in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be walked.
    pub async fn sync(&self) -> Result<()> {
        let _guard = self.syncing.lock().await;
        let start = Instant::now();

        let ctx = Arc::clone(&self.ctx);
        let state = tokio::task::spawn_blocking(move || build(&ctx))
            .await
            .map_err(|e| Error::internal(format!("sync task failed: {e}")))??;

        let total = state.lookup.len();
        *self.state.write() = state;

        let took = start.elapsed();
        TREE_SYNCS.with_label_values(&[self.source.as_str()]).inc();
        TREE_SYNC_DURATION.observe(took.as_secs_f64());
        tracing::info!(
            source = %self.source,
            path = %pathutil::pretty(&self.path, &self.path),
            nodes = total,
            "Synced tree in {:?}",
            took
        );

        self.broker.accept(TOPIC_SYNCED, format!("{total} node/s in {took:.2?}"));
        Ok(())
    }

    /// Node by URL; case and separators are ignored, leading and trailing
    /// slashes are allowed.
    #[must_use]
    pub fn get(&self, url: &str) -> Option<Arc<Node>> {
        self.state.read().lookup.get(&lookup_node_url(url)).cloned()
    }

    /// All nodes in neighbor order.
    #[must_use]
    pub fn get_all(&self) -> Vec<Arc<Node>> {
        let state = self.state.read();
        state
            .ordered
            .iter()
            .filter_map(|u| state.lookup.get(&lookup_node_url(u)).cloned())
            .collect()
    }

    #[must_use]
    pub fn root(&self) -> Option<Arc<Node>> {
        self.state.read().root.clone()
    }

    #[must_use]
    pub fn total_nodes(&self) -> usize {
        self.state.read().lookup.len()
    }

    /// Previous and next node in tree order. There is no wrap-around.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is not part of the current tree.
    pub fn neighbor_nodes(&self, node: &Node) -> Result<(Option<Arc<Node>>, Option<Arc<Node>>)> {
        let state = self.state.read();
        let url = node.unnormalized_url();
        let i = state
            .ordered
            .binary_search(&url)
            .map_err(|_| Error::not_found(format!("node '{url}' in ordered list")))?;

        let at = |i: usize| {
            state
                .ordered
                .get(i)
                .and_then(|u| state.lookup.get(&lookup_node_url(u)).cloned())
        };
        let prev = i.checked_sub(1).and_then(&at);
        Ok((prev, at(i + 1)))
    }

    /// Hash of the whole tree, see [`Node::calculate_hash`].
    ///
    /// # Errors
    ///
    /// Returns an error if the tree was never synced or hashing fails.
    pub async fn calculate_hash(&self) -> Result<String> {
        let root = self.root().ok_or(TreeError::NotSynced)?;
        tokio::task::spawn_blocking(move || root.calculate_hash())
            .await
            .map_err(|e| Error::internal(format!("hash task failed: {e}")))?
    }
}

impl NodeGetter for Tree {
    fn get(&self, url: &str) -> Option<Arc<Node>> {
        Self::get(self, url)
    }
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("path", &self.path)
            .field("source", &self.source)
            .field("nodes", &self.total_nodes())
            .finish_non_exhaustive()
    }
}

fn build(ctx: &Arc<NodeContext>) -> Result<TreeState> {
    let root = &ctx.root;
    let walk_error = |reason: String| TreeError::Walk {
        path: root.display().to_string(),
        reason,
    };

    let mut nodes: Vec<Arc<Node>> = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
        let entry = entry.map_err(|e| walk_error(e.to_string()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let node = match Node::open(entry.path(), Arc::clone(ctx)) {
            Ok(node) => node,
            Err(e) => {
                // Keep the node, so the tree has no gaps.
                tracing::warn!(path = %pathutil::pretty(root, entry.path()), error = %e, "Failed to load node meta");
                Node::new(entry.path(), Arc::clone(ctx))
            }
        };
        nodes.push(Arc::new(node));
    }

    let by_path: HashMap<&Path, &Arc<Node>> = nodes.iter().map(|n| (n.path(), n)).collect();
    let mut children: HashMap<PathBuf, Vec<Arc<Node>>> = HashMap::new();
    for node in &nodes {
        if node.is_root() {
            continue;
        }
        let Some(parent) = node.path().parent().and_then(|p| by_path.get(p)) else {
            continue;
        };
        node.set_parent(parent);
        children
            .entry(parent.path().to_path_buf())
            .or_default()
            .push(Arc::clone(node));
    }

    let mut state = TreeState::default();
    for node in &nodes {
        node.set_children(children.remove(node.path()).unwrap_or_default());

        let key = node.lookup_url();
        if let Some(existing) = state.lookup.get(&key) {
            tracing::warn!(
                path = %pathutil::pretty(root, node.path()),
                existing = %pathutil::pretty(root, existing.path()),
                "Skipping node, its URL is already taken"
            );
            continue;
        }
        if node.is_root() {
            state.root = Some(Arc::clone(node));
        }
        state.ordered.push(node.unnormalized_url());
        state.lookup.insert(key, Arc::clone(node));
    }
    state.ordered.sort();

    if state.root.is_none() {
        return Err(walk_error("root is not a directory".to_string()).into());
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::author::AuthorStore;
    use crate::config::ConfigStore;
    use crate::meta::MetaStore;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn tree(root: &Path, broker: Broker) -> Tree {
        let ctx = Arc::new(NodeContext {
            root: root.to_path_buf(),
            config: Arc::new(ConfigStore::static_defaults("Example")),
            meta: MetaStore::Noop,
            authors: Arc::new(AuthorStore::Noop),
        });
        Tree::new(ctx, "live", broker)
    }

    fn fixture() -> TempDir {
        let tmp = TempDir::new().unwrap();
        for dir in [
            "01_Foundations/02_Colors",
            "01_Foundations/01_Type",
            "02_Components/Button",
            ".git/objects",
            "02_Components/.hidden",
        ] {
            std::fs::create_dir_all(tmp.path().join(dir)).unwrap();
        }
        std::fs::write(tmp.path().join("02_Components/Button/meta.yaml"), "tags: [: broken").unwrap();
        tmp
    }

    #[tokio::test]
    async fn test_sync_and_get() {
        let tmp = fixture();
        let broker = Broker::new();
        let mut sub = broker.subscribe(TOPIC_SYNCED);
        let t = tree(tmp.path(), broker.clone());

        assert!(t.get("").is_none());
        t.sync().await.unwrap();

        assert_eq!(t.total_nodes(), 6);
        assert!(t.root().unwrap().is_root());
        let colors = t.get("Foundations/Colors").unwrap();
        assert_eq!(colors.url(), "Foundations/Colors");
        for url in ["/foundations/colors", "FOUNDATIONS/COLORS/", "foundations/colors"] {
            assert_eq!(t.get(url).unwrap().path(), colors.path(), "{url}");
        }
        assert!(t.get(".git").is_none());
        assert!(t.get("Components/.hidden").is_none());

        // Broken meta keeps the node.
        assert!(t.get("Components/Button").is_some());

        let m = sub.recv().await.unwrap();
        assert_eq!(m.topic, TOPIC_SYNCED);
        assert!(m.text.starts_with("6 node/s in"), "{}", m.text);
        broker.close();
    }

    #[tokio::test]
    async fn test_parent_and_children() {
        let tmp = fixture();
        let t = tree(tmp.path(), Broker::new());
        t.sync().await.unwrap();

        let foundations = t.get("Foundations").unwrap();
        let children: Vec<_> = foundations.children().iter().map(|n| n.url()).collect();
        assert_eq!(children, vec!["Foundations/Type", "Foundations/Colors"]);
        for child in foundations.children() {
            assert_eq!(child.parent().unwrap().path(), foundations.path());
        }
        assert!(t.root().unwrap().parent().is_none());
    }

    #[tokio::test]
    async fn test_neighbor_nodes() {
        let tmp = fixture();
        let t = tree(tmp.path(), Broker::new());
        t.sync().await.unwrap();

        let all: Vec<_> = t.get_all().iter().map(|n| n.unnormalized_url()).collect();
        assert_eq!(
            all,
            vec![
                "",
                "01_Foundations",
                "01_Foundations/01_Type",
                "01_Foundations/02_Colors",
                "02_Components",
                "02_Components/Button",
            ]
        );

        let root = t.root().unwrap();
        let (prev, next) = t.neighbor_nodes(&root).unwrap();
        assert!(prev.is_none());
        assert_eq!(next.unwrap().url(), "Foundations");

        let last = t.get("Components/Button").unwrap();
        let (prev, next) = t.neighbor_nodes(&last).unwrap();
        assert_eq!(prev.unwrap().url(), "Components");
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_hash_changes_with_files() {
        let tmp = fixture();
        let t = tree(tmp.path(), Broker::new());
        assert!(t.calculate_hash().await.is_err());

        t.sync().await.unwrap();
        let before = t.calculate_hash().await.unwrap();
        t.sync().await.unwrap();
        assert_eq!(t.calculate_hash().await.unwrap(), before);

        let file = std::fs::File::create(tmp.path().join("01_Foundations/02_Colors/readme.md")).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(3600)).unwrap();
        drop(file);

        t.sync().await.unwrap();
        assert_ne!(t.calculate_hash().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_sync_missing_root_keeps_state() {
        let tmp = fixture();
        let t = tree(tmp.path(), Broker::new());
        t.sync().await.unwrap();

        let path = tmp.path().to_path_buf();
        drop(tmp);
        assert!(!path.exists());
        assert!(t.sync().await.is_err());
        assert_eq!(t.total_nodes(), 6);
    }
}
