//! A directory inside the design definitions tree.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, Weak};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sha1::{Digest, Sha1};

use super::asset::NodeAsset;
use super::doc::NodeDoc;
use super::meta::{NodeMeta, META_REGEX};
use super::url::{lookup_node_url, nfc, normalize_node_url, order_number, remove_order_number};
use crate::author::{Author, AuthorStore};
use crate::config::ConfigStore;
use crate::meta::MetaStore;
use crate::Result;

/// Basenames considered documents.
pub static DOC_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^.*\.(md|markdown|html?|txt)$").expect("valid regex"));

/// Files that are never assets, in addition to meta and document files.
pub static ASSET_IGNORE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(dsk|dsk\.(json|ya?ml)|AUTHORS\.txt|empty)$").expect("valid regex")
});

/// Looks up nodes by URL.
pub trait NodeGetter {
    fn get(&self, url: &str) -> Option<Arc<Node>>;
}

impl<F> NodeGetter for F
where
    F: Fn(&str) -> Option<Arc<Node>>,
{
    fn get(&self, url: &str) -> Option<Arc<Node>> {
        self(url)
    }
}

/// Stores and settings shared by all nodes of a tree.
#[derive(Debug)]
pub struct NodeContext {
    /// Absolute path to the tree root.
    pub root: PathBuf,
    pub config: Arc<ConfigStore>,
    pub meta: MetaStore,
    pub authors: Arc<AuthorStore>,
}

/// A directory inside the tree.
///
/// Parent and children are set once, after all nodes of a sync have been
/// constructed. A node is never updated afterwards; each sync constructs
/// new nodes.
pub struct Node {
    path: PathBuf,
    ctx: Arc<NodeContext>,
    meta: NodeMeta,
    parent: OnceLock<Weak<Node>>,
    children: OnceLock<Vec<Arc<Node>>>,
    hash: OnceLock<String>,
}

impl Node {
    /// A node without metadata.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, ctx: Arc<NodeContext>) -> Self {
        Self {
            path: path.into(),
            ctx,
            meta: NodeMeta::default(),
            parent: OnceLock::new(),
            children: OnceLock::new(),
            hash: OnceLock::new(),
        }
    }

    /// A node with metadata loaded from its sidecar file, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the sidecar file is invalid.
    pub fn open(path: impl Into<PathBuf>, ctx: Arc<NodeContext>) -> Result<Self> {
        let mut node = Self::new(path, ctx);
        node.meta = NodeMeta::find_and_load(&node.path)?;
        Ok(node)
    }

    pub(crate) fn set_parent(&self, parent: &Arc<Self>) {
        let _ = self.parent.set(Arc::downgrade(parent));
    }

    pub(crate) fn set_children(&self, children: Vec<Arc<Self>>) {
        let _ = self.children.set(children);
    }

    /// Absolute path to the node's directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.path == self.ctx.root
    }

    #[must_use]
    pub fn parent(&self) -> Option<Arc<Self>> {
        self.parent.get().and_then(Weak::upgrade)
    }

    #[must_use]
    pub fn children(&self) -> &[Arc<Self>] {
        self.children.get().map_or(&[], Vec::as_slice)
    }

    /// Path relative to the tree root, slash separated.
    #[must_use]
    pub fn unnormalized_url(&self) -> String {
        self.path
            .strip_prefix(&self.ctx.root)
            .map(|rel| {
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or_default()
    }

    /// Normalized URL addressing this node, i.e. `Input/Password`.
    #[must_use]
    pub fn url(&self) -> String {
        normalize_node_url(&self.unnormalized_url())
    }

    /// Lower-cased, separator-free lookup key.
    #[must_use]
    pub fn lookup_url(&self) -> String {
        lookup_node_url(&self.unnormalized_url())
    }

    fn basename(&self) -> String {
        nfc(&self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default())
    }

    /// Order number as a hint for sorting.
    #[must_use]
    pub fn order(&self) -> u64 {
        order_number(&self.basename())
    }

    /// Basename without order number.
    #[must_use]
    pub fn name(&self) -> String {
        remove_order_number(&self.basename())
    }

    /// Display title; the project name for the root node.
    #[must_use]
    pub fn title(&self) -> String {
        if self.is_root() {
            return self.ctx.config.data().project.clone();
        }
        self.name()
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.meta.description
    }

    #[must_use]
    pub const fn custom(&self) -> &serde_json::Value {
        &self.meta.custom
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.meta.version
    }

    /// Tags, sorted alphabetically.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        let mut tags = self.meta.tags.clone();
        tags.sort();
        tags
    }

    #[must_use]
    pub fn keywords(&self) -> &[String] {
        &self.meta.keywords
    }

    /// Authors, with display names resolved where known.
    #[must_use]
    pub fn authors(&self) -> Vec<Author> {
        self.meta
            .authors
            .iter()
            .map(|email| {
                self.ctx.authors.get_by_email(email).unwrap_or_else(|| Author {
                    email: email.clone(),
                    name: String::new(),
                })
            })
            .collect()
    }

    /// Related nodes; unresolvable relations are skipped.
    pub fn related(&self, get: &dyn NodeGetter) -> Vec<Arc<Self>> {
        self.meta
            .related
            .iter()
            .filter_map(|url| {
                let found = get.get(url);
                if found.is_none() {
                    tracing::warn!(node = %self.url(), related = %url, "Skipping related, not found in tree");
                }
                found
            })
            .collect()
    }

    /// Nodes along the URL path down to this one; excludes the root.
    pub fn crumbs(&self, get: &dyn NodeGetter) -> Vec<Arc<Self>> {
        let url = self.url();
        if url.is_empty() {
            return Vec::new();
        }
        let parts: Vec<&str> = url.split('/').collect();

        (1..=parts.len())
            .filter_map(|i| {
                let prefix = parts[..i].join("/");
                let found = get.get(&prefix);
                if found.is_none() {
                    tracing::warn!(node = %url, crumb = %prefix, "Skipping crumb, not found in tree");
                }
                found
            })
            .collect()
    }

    /// Most recent modification of anything in or below the node.
    ///
    /// # Errors
    ///
    /// Returns an error if the meta store has no answer.
    pub async fn modified(&self) -> Result<DateTime<Utc>> {
        self.ctx.meta.modified(&self.path).await
    }

    fn files(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            files.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
        }
        files.sort();
        Ok(files)
    }

    fn asset_for(&self, name: &str, path: PathBuf) -> NodeAsset {
        let url = if self.url().is_empty() {
            name.to_string()
        } else {
            format!("{}/{name}", self.url())
        };
        NodeAsset::new(path, url, self.ctx.meta.clone())
    }

    /// Files that are not hidden, documents, metadata or system files.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn assets(&self) -> Result<Vec<NodeAsset>> {
        Ok(self
            .files()?
            .into_iter()
            .filter(|(name, _)| {
                !name.starts_with('.')
                    && !META_REGEX.is_match(name)
                    && !DOC_REGEX.is_match(name)
                    && !ASSET_IGNORE_REGEX.is_match(name)
            })
            .map(|(name, path)| self.asset_for(&name, path))
            .collect())
    }

    /// Asset by basename; the name may omit the file's order number.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn asset(&self, name: &str) -> Result<Option<NodeAsset>> {
        if let Some(found) = self.assets()?.into_iter().find(|a| a.name() == name) {
            return Ok(Some(found));
        }
        if name.is_empty() || name.contains('/') || name.starts_with('.') {
            return Ok(None);
        }
        let path = self.path.join(name);
        if path.is_file() {
            return Ok(Some(self.asset_for(name, path)));
        }
        Ok(None)
    }

    /// Documents, ordered by filename.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn docs(&self) -> Result<Vec<NodeDoc>> {
        Ok(self
            .files()?
            .into_iter()
            .filter(|(name, _)| {
                !name.starts_with('.') && DOC_REGEX.is_match(name) && !ASSET_IGNORE_REGEX.is_match(name)
            })
            .map(|(_, path)| NodeDoc::new(path))
            .collect())
    }

    /// Most recent modification among the node's own non-hidden entries,
    /// as Unix seconds.
    fn modified_for_identity(&self) -> Result<i64> {
        let mut newest = 0;
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let secs = entry
                .metadata()?
                .modified()?
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX));
            newest = newest.max(secs);
        }
        Ok(newest)
    }

    /// Hash over the node's path and modification time, combined with the
    /// hashes of all children. Cached for the lifetime of the node.
    ///
    /// # Errors
    ///
    /// Returns an error if a node directory cannot be read.
    pub fn calculate_hash(&self) -> Result<String> {
        if let Some(hash) = self.hash.get() {
            return Ok(hash.clone());
        }

        let mut own = Sha1::new();
        own.update(self.path.as_os_str().as_encoded_bytes());
        own.update(self.modified_for_identity()?.to_string().as_bytes());

        let mut combined = Sha1::new();
        combined.update(own.finalize());
        for child in self.children() {
            combined.update(child.calculate_hash()?.as_bytes());
        }

        let hash = hex::encode(combined.finalize());
        Ok(self.hash.get_or_init(|| hash).clone())
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("path", &self.path)
            .field("children", &self.children().len())
            .finish_non_exhaustive()
    }
}
